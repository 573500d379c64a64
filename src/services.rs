use crate::model::*;
use crate::repository::{Repository, RepositoryError};
use chrono::Utc;
use std::str::FromStr;
use thiserror::Error;

#[cfg(not(test))]
pub const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
pub const HASH_COST: u32 = 4;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("movie does not exist")]
    MovieNotFound,
    #[error("user is not known")]
    UnknownUser,
    #[error("no movie title given")]
    NonExistentMovie,
    #[error("no actor given")]
    NonExistentActor,
    #[error("no director given")]
    NonExistentDirector,
    #[error("no genre given")]
    NonExistentGenre,
    #[error("cannot search by {0}")]
    UnknownSearchParameter(String),
    #[error("username {0} is already taken")]
    NameNotUnique(String),
    #[error("username or password is incorrect")]
    Authentication,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

pub fn get_ten_movies(repo: &dyn Repository) -> Result<Vec<Movie>> {
    Ok(repo.get_10_movies()?)
}

pub fn get_genres(repo: &dyn Repository) -> Result<Vec<Genre>> {
    Ok(repo.get_genres()?)
}

pub fn get_10_movies_genre(repo: &dyn Repository, genre: &Genre) -> Result<Vec<Movie>> {
    Ok(repo.get_10_movies_genre(genre)?)
}

pub fn get_all_movies_genre(repo: &dyn Repository, genre: Option<&Genre>) -> Result<Vec<Movie>> {
    let genre = genre.ok_or(ServiceError::NonExistentGenre)?;
    Ok(repo.get_all_movies_genre(genre)?)
}

pub fn get_movie(repo: &dyn Repository, title: &str) -> Result<Option<Movie>> {
    Ok(repo.get_movie_by_title(title)?)
}

pub fn get_reviews_for_movie(repo: &dyn Repository, title: &str) -> Result<Vec<Review>> {
    let movie = repo
        .get_movie_by_title(title)?
        .ok_or(ServiceError::MovieNotFound)?;
    Ok(repo.get_review_for_movie(&movie)?)
}

/// Writes a review of `movie` as `username` and stores it.
pub fn add_review(
    repo: &dyn Repository,
    movie: &Movie,
    review_text: &str,
    rating: i64,
    username: &str,
) -> Result<Review> {
    let mut movie = repo.get_movie(movie)?.ok_or(ServiceError::MovieNotFound)?;
    let mut user = repo.get_user(username)?.ok_or(ServiceError::UnknownUser)?;
    let review = make_review(review_text, &mut user, &mut movie, rating, Utc::now())?;
    repo.add_review(review.clone())?;
    Ok(review)
}

pub fn get_movies_by_title(repo: &dyn Repository, title: Option<&str>) -> Result<Vec<Movie>> {
    let title = title.ok_or(ServiceError::NonExistentMovie)?;
    Ok(repo.get_movies_by_title(title)?)
}

pub fn get_movies_by_director(repo: &dyn Repository, director: Option<&str>) -> Result<Vec<Movie>> {
    let director = director.ok_or(ServiceError::NonExistentDirector)?;
    Ok(repo.get_movies_by_director(director)?)
}

pub fn get_movies_by_actor(repo: &dyn Repository, actor: Option<&str>) -> Result<Vec<Movie>> {
    let actor = actor.ok_or(ServiceError::NonExistentActor)?;
    Ok(repo.get_movies_by_actor(actor)?)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchParameter {
    Title,
    Director,
    Actor,
}

impl FromStr for SearchParameter {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<SearchParameter> {
        match s.trim().to_lowercase().as_str() {
            "title" => Ok(SearchParameter::Title),
            "director" => Ok(SearchParameter::Director),
            "actor" => Ok(SearchParameter::Actor),
            other => Err(ServiceError::UnknownSearchParameter(other.to_owned())),
        }
    }
}

pub fn search(
    repo: &dyn Repository,
    parameter: SearchParameter,
    value: Option<&str>,
) -> Result<Vec<Movie>> {
    match parameter {
        SearchParameter::Title => get_movies_by_title(repo, value),
        SearchParameter::Director => get_movies_by_director(repo, value),
        SearchParameter::Actor => get_movies_by_actor(repo, value),
    }
}

pub fn add_user(repo: &dyn Repository, username: &str, password: &str) -> Result<User> {
    let hash = bcrypt::hash(password, HASH_COST)?;
    let user = User::new(username, &hash);
    if !repo.add_user(user.clone())? {
        return Err(ServiceError::NameNotUnique(user.username));
    }
    Ok(user)
}

pub fn get_user(repo: &dyn Repository, username: &str) -> Result<User> {
    repo.get_user(username)?.ok_or(ServiceError::UnknownUser)
}

pub fn authenticate_user(repo: &dyn Repository, username: &str, password: &str) -> Result<User> {
    let user = repo
        .get_user(username)?
        .ok_or(ServiceError::Authentication)?;
    if bcrypt::verify(password, &user.password)? {
        Ok(user)
    } else {
        Err(ServiceError::Authentication)
    }
}
