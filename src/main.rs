mod config;
mod model;
mod poster;
mod reader;
mod repository;
mod routes;
mod services;

use actix_identity::{CookieIdentityPolicy, IdentityService};
use actix_web::{middleware::Logger, web, App, HttpServer};
use config::{Backend, Config, ConfigError};
use log::info;
use poster::PosterClient;
use reader::{MovieFileCsvReader, ReaderError};
use repository::{DatabaseRepository, MemoryRepository, Repository, RepositoryError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("loading data: {0}")]
    Reader(#[from] ReaderError),
    #[error("repository: {0}")]
    Repository(#[from] RepositoryError),
    #[error("templates: {0}")]
    Templates(#[from] tera::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

async fn load_repository(config: &Config) -> Result<Arc<dyn Repository>, StartupError> {
    let repo: Arc<dyn Repository> = match config.repository {
        Backend::Memory => Arc::new(MemoryRepository::new()),
        Backend::Database if config.database_path.as_os_str() == ":memory:" => {
            Arc::new(DatabaseRepository::in_memory()?)
        }
        Backend::Database => Arc::new(DatabaseRepository::open(&config.database_path)?),
    };
    if repo.get_number_of_movies()? > 0 {
        info!("{} already holds movies", config.database_path.display());
        return Ok(repo);
    }

    let mut reader = MovieFileCsvReader::new(config.movies_file());
    reader.read_csv_file()?;
    let users_file = config.users_file();
    if users_file.exists() {
        reader.read_users_file(&users_file, services::HASH_COST)?;
    }
    PosterClient::new(config.omdb_api_key.clone())
        .enrich(reader.dataset_of_movies_mut())
        .await;
    repository::populate(repo.as_ref(), &reader)?;
    Ok(repo)
}

#[actix_rt::main]
async fn main() -> Result<(), StartupError> {
    std::env::set_var("RUST_BACKTRACE", "1");
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("cinebase=debug,actix_web=info"),
    )
    .init();

    let config = Config::from_env()?;
    let repo = load_repository(&config).await?;
    let tera = web::Data::new(routes::templates()?);
    let repo = web::Data::from(repo);
    let secret_key = config.secret_key.clone();

    info!("listening on {}", config.bind_address);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(IdentityService::new(
                CookieIdentityPolicy::new(&secret_key)
                    .name("auth-cookie")
                    .secure(false),
            ))
            .app_data(tera.clone())
            .app_data(repo.clone())
            .configure(routes::configure)
    })
    .bind(&config.bind_address)?
    .run()
    .await?;
    Ok(())
}
