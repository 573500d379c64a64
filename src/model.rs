use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

pub const MIN_RELEASE_YEAR: i32 = 1900;
pub const MAX_RATING: i64 = 10;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("movie title must not be empty")]
    EmptyTitle,
    #[error("release year {0} is before 1900")]
    InvalidReleaseYear(i32),
    #[error("runtime must be a positive number of minutes, got {0}")]
    InvalidRuntime(i64),
    #[error("review rating {0} is outside 0..=10")]
    InvalidRating(i64),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Genre {
    pub name: String,
}

impl Genre {
    pub fn new(name: &str) -> Genre {
        Genre {
            name: name.trim().to_owned(),
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Genre {}>", self.name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Director {
    pub full_name: String,
}

impl Director {
    pub fn new(full_name: &str) -> Director {
        Director {
            full_name: full_name.trim().to_owned(),
        }
    }
}

impl fmt::Display for Director {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Director {}>", self.full_name)
    }
}

/// An actor and the names of the actors they have worked with.
///
/// Equality, hashing and ordering only look at the name, so two `Actor`s
/// with different colleague lists still count as the same person.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Actor {
    pub full_name: String,
    colleagues: Vec<String>,
}

impl Actor {
    pub fn new(full_name: &str) -> Actor {
        Actor {
            full_name: full_name.trim().to_owned(),
            colleagues: Vec::new(),
        }
    }

    pub fn colleagues(&self) -> &[String] {
        &self.colleagues
    }

    /// Records `self` and `colleague` as having worked with each other.
    pub fn add_colleague(&mut self, colleague: &mut Actor) {
        if self == colleague {
            return;
        }
        if !self.colleagues.contains(&colleague.full_name) {
            self.colleagues.push(colleague.full_name.clone());
        }
        if !colleague.colleagues.contains(&self.full_name) {
            colleague.colleagues.push(self.full_name.clone());
        }
    }

    pub fn worked_with(&self, colleague: &Actor) -> bool {
        self.colleagues.contains(&colleague.full_name)
            || colleague.colleagues.contains(&self.full_name)
    }
}

impl PartialEq for Actor {
    fn eq(&self, other: &Actor) -> bool {
        self.full_name == other.full_name
    }
}

impl Eq for Actor {}

impl Hash for Actor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.full_name.hash(state);
    }
}

impl PartialOrd for Actor {
    fn partial_cmp(&self, other: &Actor) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Actor {
    fn cmp(&self, other: &Actor) -> Ordering {
        self.full_name.cmp(&other.full_name)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Actor {}>", self.full_name)
    }
}

/// The identity of a movie. Reviews and watch lists refer to movies by key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct MovieKey {
    pub title: String,
    pub release_year: u16,
}

impl fmt::Display for MovieKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Movie {}, {}>", self.title, self.release_year)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Movie {
    title: String,
    release_year: u16,
    description: String,
    pub director: Option<Director>,
    actors: Vec<Actor>,
    genres: Vec<Genre>,
    runtime_minutes: Option<u32>,
    rating: Option<f32>,
    pub metascore: Option<u32>,
    pub num_of_ratings: u64,
    pub image: String,
    reviews: Vec<Review>,
}

impl Movie {
    pub fn new(title: &str, release_year: i32) -> Result<Movie, ModelError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ModelError::EmptyTitle);
        }
        if release_year < MIN_RELEASE_YEAR || release_year > u16::MAX as i32 {
            return Err(ModelError::InvalidReleaseYear(release_year));
        }
        Ok(Movie {
            title: title.to_owned(),
            release_year: release_year as u16,
            description: String::new(),
            director: None,
            actors: Vec::new(),
            genres: Vec::new(),
            runtime_minutes: None,
            rating: None,
            metascore: None,
            num_of_ratings: 0,
            image: String::new(),
            reviews: Vec::new(),
        })
    }

    pub fn key(&self) -> MovieKey {
        MovieKey {
            title: self.title.clone(),
            release_year: self.release_year,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn release_year(&self) -> u16 {
        self.release_year
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = description.trim().to_owned();
    }

    pub fn runtime_minutes(&self) -> Option<u32> {
        self.runtime_minutes
    }

    pub fn set_runtime_minutes(&mut self, minutes: i64) -> Result<(), ModelError> {
        if minutes <= 0 || minutes > u32::MAX as i64 {
            return Err(ModelError::InvalidRuntime(minutes));
        }
        self.runtime_minutes = Some(minutes as u32);
        Ok(())
    }

    pub fn rating(&self) -> Option<f32> {
        self.rating
    }

    /// Values outside `0.0..=10.0` leave the rating untouched.
    pub fn set_rating(&mut self, rating: f32) {
        if (0.0..=10.0).contains(&rating) {
            self.rating = Some(rating);
        }
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn add_actor(&mut self, actor: Actor) {
        if !self.actors.contains(&actor) {
            self.actors.push(actor);
        }
    }

    pub fn remove_actor(&mut self, actor: &Actor) {
        self.actors.retain(|a| a != actor);
    }

    pub fn genres(&self) -> &[Genre] {
        &self.genres
    }

    pub fn add_genre(&mut self, genre: Genre) {
        if !self.genres.contains(&genre) {
            self.genres.push(genre);
        }
    }

    pub fn remove_genre(&mut self, genre: &Genre) {
        self.genres.retain(|g| g != genre);
    }

    pub fn reviews(&self) -> &[Review] {
        &self.reviews
    }

    pub fn add_review(&mut self, review: Review) {
        if !self.reviews.contains(&review) {
            self.reviews.push(review);
        }
    }
}

impl PartialEq for Movie {
    fn eq(&self, other: &Movie) -> bool {
        self.title == other.title && self.release_year == other.release_year
    }
}

impl Eq for Movie {}

impl Hash for Movie {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.title.hash(state);
        self.release_year.hash(state);
    }
}

impl PartialOrd for Movie {
    fn partial_cmp(&self, other: &Movie) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Movie {
    fn cmp(&self, other: &Movie) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl fmt::Display for Movie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Movie {}, {}>", self.title, self.release_year)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Review {
    pub movie: MovieKey,
    pub text: String,
    rating: u8,
    user: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Review {
    pub fn new(
        movie: MovieKey,
        text: &str,
        rating: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<Review, ModelError> {
        if !(0..=MAX_RATING).contains(&rating) {
            return Err(ModelError::InvalidRating(rating));
        }
        Ok(Review {
            movie,
            text: text.to_owned(),
            rating: rating as u8,
            user: None,
            timestamp,
        })
    }

    pub fn rating(&self) -> u8 {
        self.rating
    }

    /// Username of the author, once one has been assigned.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Sets the author. The first assignment wins; returns whether this call
    /// set it.
    pub fn assign_user(&mut self, user: &User) -> bool {
        self.assign_author(&user.username)
    }

    pub(crate) fn assign_author(&mut self, username: &str) -> bool {
        if self.user.is_some() {
            return false;
        }
        self.user = Some(username.to_owned());
        true
    }
}

impl PartialEq for Review {
    fn eq(&self, other: &Review) -> bool {
        self.movie == other.movie
            && self.rating == other.rating
            && self.text == other.text
            && self.timestamp == other.timestamp
    }
}

pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub username: String,
    pub password: String,
    reviews: Vec<Review>,
    watched_movies: Vec<MovieKey>,
    time_spent_watching_minutes: u32,
}

impl User {
    pub fn new(username: &str, password: &str) -> User {
        User {
            username: normalize_username(username),
            password: password.to_owned(),
            reviews: Vec::new(),
            watched_movies: Vec::new(),
            time_spent_watching_minutes: 0,
        }
    }

    pub fn reviews(&self) -> &[Review] {
        &self.reviews
    }

    pub fn add_review(&mut self, review: Review) {
        if !self.reviews.contains(&review) {
            self.reviews.push(review);
        }
    }

    pub fn watched_movies(&self) -> &[MovieKey] {
        &self.watched_movies
    }

    pub fn time_spent_watching_minutes(&self) -> u32 {
        self.time_spent_watching_minutes
    }

    pub fn watch_movie(&mut self, movie: &Movie) {
        let key = movie.key();
        if self.watched_movies.contains(&key) {
            return;
        }
        self.watched_movies.push(key);
        self.time_spent_watching_minutes = self
            .time_spent_watching_minutes
            .saturating_add(movie.runtime_minutes().unwrap_or(0));
    }
}

impl PartialEq for User {
    fn eq(&self, other: &User) -> bool {
        self.username == other.username
    }
}

impl Eq for User {}

impl Hash for User {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.username.hash(state);
    }
}

/// Creates a review written by `user` about `movie` and attaches it to both.
pub fn make_review(
    text: &str,
    user: &mut User,
    movie: &mut Movie,
    rating: i64,
    timestamp: DateTime<Utc>,
) -> Result<Review, ModelError> {
    let mut review = Review::new(movie.key(), text, rating, timestamp)?;
    review.assign_user(user);
    user.add_review(review.clone());
    movie.add_review(review.clone());
    Ok(review)
}
