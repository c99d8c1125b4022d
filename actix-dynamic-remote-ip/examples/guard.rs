//! Demonstrates guarding routes with Cloudflare's published IP ranges.
//!
//! The source configuration is read as JSON, the way a host's config loader would hand it over.

use std::io;

use actix_dynamic_remote_ip::{
    DynamicRemoteIp, DynamicRemoteIpConfig, SourceContext, SourceRegistry, TrustedClientIp,
};
use actix_web::{App, HttpResponse, HttpServer, Responder, get, web};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[get("/client-ip")]
async fn trusted_client_ip(client_ip: TrustedClientIp) -> impl Responder {
    format!("Trusted client IP: {client_ip}")
}

async fn via_cloudflare() -> impl Responder {
    HttpResponse::Ok().body("request came through Cloudflare")
}

async fn direct() -> impl Responder {
    HttpResponse::Forbidden().body("direct connections are not allowed")
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = serde_json::from_str::<DynamicRemoteIpConfig>(
        r#"{ "providers": { "source": "cloudflare", "interval": "30m", "timeout": "10s" } }"#,
    )?;

    let shutdown = CancellationToken::new();
    let ctx = SourceContext::new(shutdown.clone());

    let cloudflare = DynamicRemoteIp::from_config(&config, &SourceRegistry::with_builtin(), &ctx)
        .await
        .map_err(io::Error::other)?;

    let bind = ("127.0.0.1", 8080);
    info!("starting server at http://{}:{}", &bind.0, &bind.1);

    HttpServer::new(move || {
        App::new()
            .app_data(cloudflare.clone())
            .service(trusted_client_ip)
            .service(
                web::resource("/")
                    .guard(cloudflare.clone())
                    .to(via_cloudflare),
            )
            .default_service(web::to(direct))
    })
    .workers(2)
    .bind(bind)?
    .run()
    .await?;

    shutdown.cancel();

    Ok(())
}
