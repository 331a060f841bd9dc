use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware, middleware::Logger, web, App, HttpServer};
use gophermart_engine::{OrderFlowApi, PgDatabase};

use crate::{auth::TokenIssuer, config::ServerConfig, errors::ServerError, routes};

pub async fn run_server(config: ServerConfig, db: PgDatabase) -> Result<(), ServerError> {
    let srv = create_server_instance(config, db)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(config: ServerConfig, db: PgDatabase) -> Result<Server, ServerError> {
    let issuer = TokenIssuer::new(&config.auth).map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
    let srv = HttpServer::new(move || {
        let api = OrderFlowApi::new(Arc::new(db.clone()));
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %U").log_target("gophermart_requests"))
            .wrap(middleware::Compress::default())
            .app_data(web::Data::new(api))
            .app_data(web::Data::new(issuer.clone()))
            .configure(routes::configure::<PgDatabase>)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind(config.run_address.as_str())?
    .run();
    Ok(srv)
}
