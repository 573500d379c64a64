use crate::model::*;
use crate::repository::Repository;
use crate::services::{self, SearchParameter, ServiceError};
use actix_identity::Identity;
use actix_web::{error, web, HttpRequest, HttpResponse};
use log::{debug, info};
use serde::{Deserialize, Serialize};

type Tera = web::Data<tera::Tera>;
type Repo = web::Data<dyn Repository>;

const MIN_COMMENT_LENGTH: usize = 4;
const MIN_USERNAME_LENGTH: usize = 3;
const MIN_PASSWORD_LENGTH: usize = 7;

pub fn templates() -> tera::Result<tera::Tera> {
    tera::Tera::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/**/*"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/gen", web::get().to(movies_by_genre))
        .route("/search", web::get().to(search))
        .route("/info", web::get().to(movie_info))
        .route("/comment", web::get().to(comment))
        .route("/comment", web::post().to(comment_post))
        .route("/login", web::get().to(login))
        .route("/login", web::post().to(login_post))
        .route("/register", web::get().to(register))
        .route("/register", web::post().to(register_post))
        .route("/logout", web::get().to(logout));
}

pub fn log_error<E: std::fmt::Debug>(err: E, message: &'static str) -> error::Error {
    debug!("{:?}", err);
    error::ErrorInternalServerError(message)
}

fn service_error(err: ServiceError) -> error::Error {
    match err {
        ServiceError::MovieNotFound => error::ErrorNotFound("Movie not found"),
        ServiceError::NonExistentMovie
        | ServiceError::NonExistentActor
        | ServiceError::NonExistentDirector
        | ServiceError::NonExistentGenre
        | ServiceError::UnknownSearchParameter(_) => error::ErrorBadRequest(err.to_string()),
        err => log_error(err, "Internal error"),
    }
}

fn render(tera: &tera::Tera, template: &str, ctx: &tera::Context) -> actix_web::Result<HttpResponse> {
    let body = tera
        .render(template, ctx)
        .map_err(|err| log_error(err, "Template error"))?;
    Ok(HttpResponse::Ok().content_type("text/html").body(body))
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header(("location", location))
        .finish()
}

fn context(id: &Identity) -> tera::Context {
    let mut ctx = tera::Context::new();
    if let Some(username) = id.identity() {
        ctx.insert("username", &username);
    }
    ctx
}

fn info_location(title: &str) -> actix_web::Result<String> {
    let url = reqwest::Url::parse_with_params("http://localhost/info", &[("movie", title)])
        .map_err(|err| log_error(err, "Redirect error"))?;
    Ok(format!("{}?{}", url.path(), url.query().unwrap_or_default()))
}

#[derive(Serialize)]
struct GenreListing {
    genre: Genre,
    movies: Vec<Movie>,
}

async fn index(id: Identity, tera: Tera, repo: Repo) -> actix_web::Result<HttpResponse> {
    let repo = repo.get_ref();
    let mut ctx = context(&id);
    let ten_movies = services::get_ten_movies(repo).map_err(service_error)?;
    let listings = services::get_genres(repo)
        .map_err(service_error)?
        .into_iter()
        .map(|genre| -> services::Result<GenreListing> {
            let movies = services::get_10_movies_genre(repo, &genre)?;
            Ok(GenreListing { genre, movies })
        })
        .collect::<services::Result<Vec<_>>>()
        .map_err(service_error)?;
    ctx.insert("ten_movies", &ten_movies);
    ctx.insert("listings", &listings);
    render(&tera, "home.html", &ctx)
}

#[derive(Deserialize)]
struct GenreParams {
    genre: Option<String>,
}

async fn movies_by_genre(
    params: web::Query<GenreParams>,
    id: Identity,
    tera: Tera,
    repo: Repo,
) -> actix_web::Result<HttpResponse> {
    let genre = params.genre.as_deref().map(Genre::new);
    let movies =
        services::get_all_movies_genre(repo.get_ref(), genre.as_ref()).map_err(service_error)?;
    let mut ctx = context(&id);
    ctx.insert("genre", &genre);
    ctx.insert("movies", &movies);
    render(&tera, "genre.html", &ctx)
}

#[derive(Deserialize)]
struct SearchParams {
    parameter: Option<String>,
    search_parameter: Option<String>,
}

async fn search(
    params: web::Query<SearchParams>,
    id: Identity,
    tera: Tera,
    repo: Repo,
) -> actix_web::Result<HttpResponse> {
    let mut ctx = context(&id);
    if let Some(parameter) = &params.parameter {
        let parameter: SearchParameter = parameter.parse().map_err(service_error)?;
        let value = params
            .search_parameter
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());
        match services::search(repo.get_ref(), parameter, value) {
            Ok(movies) => {
                ctx.insert("query", &value);
                ctx.insert("movies", &movies);
            }
            Err(ServiceError::NonExistentMovie)
            | Err(ServiceError::NonExistentDirector)
            | Err(ServiceError::NonExistentActor) => {
                ctx.insert("error", "Enter something to search for");
            }
            Err(err) => return Err(service_error(err)),
        }
    }
    render(&tera, "search.html", &ctx)
}

#[derive(Deserialize)]
struct MovieParams {
    movie: String,
}

async fn movie_info(
    params: web::Query<MovieParams>,
    id: Identity,
    tera: Tera,
    repo: Repo,
) -> actix_web::Result<HttpResponse> {
    let movie = services::get_movie(repo.get_ref(), &params.movie)
        .map_err(service_error)?
        .ok_or_else(|| error::ErrorNotFound("Movie not found"))?;
    let reviews =
        services::get_reviews_for_movie(repo.get_ref(), movie.title()).map_err(service_error)?;
    let mut ctx = context(&id);
    ctx.insert("movie", &movie);
    ctx.insert("reviews", &reviews);
    render(&tera, "movie_info.html", &ctx)
}

async fn comment(
    params: web::Query<MovieParams>,
    id: Identity,
    tera: Tera,
    repo: Repo,
) -> actix_web::Result<HttpResponse> {
    let username = match id.identity() {
        Some(username) => username,
        None => return Ok(redirect("/login")),
    };
    match services::get_user(repo.get_ref(), &username) {
        Ok(_) => {}
        Err(ServiceError::UnknownUser) => {
            id.forget();
            return Ok(redirect("/login"));
        }
        Err(err) => return Err(service_error(err)),
    }
    let movie = services::get_movie(repo.get_ref(), &params.movie)
        .map_err(service_error)?
        .ok_or_else(|| error::ErrorNotFound("Movie not found"))?;
    let mut ctx = context(&id);
    ctx.insert("movie", &movie);
    render(&tera, "comment.html", &ctx)
}

#[derive(Deserialize)]
struct CommentParams {
    movie: String,
    comment: String,
    rating: i64,
}

async fn comment_post(
    params: web::Form<CommentParams>,
    id: Identity,
    tera: Tera,
    repo: Repo,
) -> actix_web::Result<HttpResponse> {
    let username = match id.identity() {
        Some(username) => username,
        None => return Ok(redirect("/login")),
    };
    let repo = repo.get_ref();
    let movie = services::get_movie(repo, &params.movie)
        .map_err(service_error)?
        .ok_or_else(|| error::ErrorNotFound("Movie not found"))?;

    let text = params.comment.trim();
    let problem = if text.chars().count() < MIN_COMMENT_LENGTH {
        Some("Your comment is too short")
    } else {
        match services::add_review(repo, &movie, text, params.rating, &username) {
            Ok(_) => None,
            Err(ServiceError::Model(ModelError::InvalidRating(_))) => {
                Some("Rating must be between 0 and 10")
            }
            Err(ServiceError::UnknownUser) => {
                id.forget();
                return Ok(redirect("/login"));
            }
            Err(err) => return Err(service_error(err)),
        }
    };
    match problem {
        None => {
            info!("{} reviewed {}", username, movie);
            Ok(redirect(&info_location(movie.title())?))
        }
        Some(problem) => {
            let mut ctx = context(&id);
            ctx.insert("movie", &movie);
            ctx.insert("comment", &params.comment);
            ctx.insert("error", problem);
            render(&tera, "comment.html", &ctx)
        }
    }
}

async fn login(req: HttpRequest, tera: Tera) -> actix_web::Result<HttpResponse> {
    let mut ctx = tera::Context::new();
    let message = match req.query_string() {
        "wrong_password" => Some("Username or password is incorrect"),
        "logout" => Some("You have been logged out"),
        "registered" => Some("Your account was created, please log in"),
        _ => None,
    };
    ctx.insert("message", &message);
    render(&tera, "login.html", &ctx)
}

#[derive(Serialize, Deserialize)]
struct LoginParams {
    username: String,
    password: String,
}

async fn login_post(
    params: web::Form<LoginParams>,
    id: Identity,
    repo: Repo,
) -> actix_web::Result<HttpResponse> {
    match services::authenticate_user(repo.get_ref(), &params.username, &params.password) {
        Ok(user) => {
            id.remember(user.username);
            Ok(redirect("/"))
        }
        Err(ServiceError::Authentication) => Ok(redirect("/login?wrong_password")),
        Err(err) => Err(service_error(err)),
    }
}

async fn register(tera: Tera) -> actix_web::Result<HttpResponse> {
    render(&tera, "register.html", &tera::Context::new())
}

async fn register_post(
    params: web::Form<LoginParams>,
    tera: Tera,
    repo: Repo,
) -> actix_web::Result<HttpResponse> {
    let username = params.username.trim();
    let problem = if username.chars().count() < MIN_USERNAME_LENGTH {
        Some("Your username is too short".to_owned())
    } else if params.password.chars().count() < MIN_PASSWORD_LENGTH {
        Some("Your password is too short".to_owned())
    } else {
        match services::add_user(repo.get_ref(), username, &params.password) {
            Ok(user) => {
                info!("registered {}", user.username);
                None
            }
            Err(err @ ServiceError::NameNotUnique(_)) => Some(err.to_string()),
            Err(err) => return Err(service_error(err)),
        }
    };
    match problem {
        None => Ok(redirect("/login?registered")),
        Some(problem) => {
            let mut ctx = tera::Context::new();
            ctx.insert("entered_username", username);
            ctx.insert("error", &problem);
            render(&tera, "register.html", &ctx)
        }
    }
}

async fn logout(id: Identity) -> actix_web::Result<HttpResponse> {
    id.forget();
    Ok(redirect("/login?logout"))
}
