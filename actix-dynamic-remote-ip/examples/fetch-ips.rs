use std::net::IpAddr;

use actix_dynamic_remote_ip::{RefreshConfig, RemoteIpRanges, SourceContext};

#[actix_web::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let ips = RemoteIpRanges::cloudflare(RefreshConfig::default(), &SourceContext::default()).await;

    if let Err(err) = ips.refresh().await {
        eprintln!("refresh failed: {err}");
    }

    let ranges = ips.snapshot();
    println!("{} ranges", ranges.len());

    for range in ranges.iter() {
        println!("{range}");
    }

    dbg!(ranges.contains(IpAddr::from([103, 21, 243, 0])));
    dbg!(ranges.contains(IpAddr::from([103, 21, 244, 0])));
    dbg!(ranges.contains(IpAddr::from([103, 21, 245, 0])));
    dbg!(ranges.contains(IpAddr::from([103, 21, 248, 0])));
}
