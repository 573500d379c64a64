use super::{contains_ignore_case, genre_limit, review_author, Repository, RepositoryError, Result};
use crate::model::*;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Store {
    movies: Vec<Movie>,
    genres: Vec<Genre>,
    users: Vec<User>,
    reviews: Vec<Review>,
    actors: Vec<Actor>,
    directors: Vec<Director>,
}

/// Keeps every entity in a plain list. Lookups scan, sorts happen per call.
#[derive(Default)]
pub struct MemoryRepository {
    store: RwLock<Store>,
}

impl MemoryRepository {
    pub fn new() -> MemoryRepository {
        MemoryRepository::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Store>> {
        self.store.read().map_err(|_| RepositoryError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Store>> {
        self.store.write().map_err(|_| RepositoryError::Poisoned)
    }

    fn movies_where<F: Fn(&Movie) -> bool>(&self, predicate: F) -> Result<Vec<Movie>> {
        Ok(self
            .read()?
            .movies
            .iter()
            .filter(|movie| predicate(movie))
            .cloned()
            .collect())
    }
}

impl Repository for MemoryRepository {
    fn add_user(&self, user: User) -> Result<bool> {
        let mut store = self.write()?;
        if store.users.contains(&user) {
            return Ok(false);
        }
        store.users.push(user);
        Ok(true)
    }

    fn get_user(&self, username: &str) -> Result<Option<User>> {
        let username = normalize_username(username);
        Ok(self
            .read()?
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    fn add_movie(&self, movie: Movie) -> Result<()> {
        let mut store = self.write()?;
        if !store.movies.contains(&movie) {
            store.movies.push(movie);
        }
        Ok(())
    }

    fn get_movie(&self, key: &Movie) -> Result<Option<Movie>> {
        Ok(self.read()?.movies.iter().find(|m| *m == key).cloned())
    }

    fn get_movie_by_title(&self, title: &str) -> Result<Option<Movie>> {
        let title = title.trim().to_lowercase();
        Ok(self
            .read()?
            .movies
            .iter()
            .find(|m| m.title().to_lowercase() == title)
            .cloned())
    }

    fn get_movies_by_title(&self, title: &str) -> Result<Vec<Movie>> {
        self.movies_where(|m| contains_ignore_case(m.title(), title))
    }

    fn get_movies_by_director(&self, director: &str) -> Result<Vec<Movie>> {
        self.movies_where(|m| {
            m.director
                .as_ref()
                .map_or(false, |d| contains_ignore_case(&d.full_name, director))
        })
    }

    fn get_movies_by_actor(&self, actor: &str) -> Result<Vec<Movie>> {
        self.movies_where(|m| {
            m.actors()
                .iter()
                .any(|a| contains_ignore_case(&a.full_name, actor))
        })
    }

    fn get_number_of_movies(&self) -> Result<usize> {
        Ok(self.read()?.movies.len())
    }

    fn get_movies_by_release(&self) -> Result<Vec<Movie>> {
        let mut movies = self.read()?.movies.clone();
        movies.sort_by(|a, b| b.release_year().cmp(&a.release_year()));
        Ok(movies)
    }

    fn get_10_movies(&self) -> Result<Vec<Movie>> {
        let mut movies = self.read()?.movies.clone();
        // Option<f32> orders None first, so unrated movies sink to the end.
        movies.sort_by(|a, b| {
            b.rating()
                .partial_cmp(&a.rating())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        movies.truncate(10);
        Ok(movies)
    }

    fn get_10_movies_genre(&self, genre: &Genre) -> Result<Vec<Movie>> {
        Ok(self
            .read()?
            .movies
            .iter()
            .filter(|m| m.genres().contains(genre))
            .take(genre_limit(genre))
            .cloned()
            .collect())
    }

    fn get_all_movies_genre(&self, genre: &Genre) -> Result<Vec<Movie>> {
        self.movies_where(|m| m.genres().contains(genre))
    }

    fn add_review(&self, review: Review) -> Result<()> {
        let author = review_author(&review)?.to_owned();
        let mut store = self.write()?;
        let user = store
            .users
            .iter()
            .position(|u| u.username == author)
            .ok_or_else(|| RepositoryError::Unattached(format!("unknown user {}", author)))?;
        let movie = store
            .movies
            .iter()
            .position(|m| m.key() == review.movie)
            .ok_or_else(|| {
                RepositoryError::Unattached(format!("unknown movie {}", review.movie))
            })?;
        if store.reviews.contains(&review) {
            return Ok(());
        }
        store.users[user].add_review(review.clone());
        store.movies[movie].add_review(review.clone());
        store.reviews.push(review);
        Ok(())
    }

    fn get_reviews(&self) -> Result<Vec<Review>> {
        Ok(self.read()?.reviews.clone())
    }

    fn get_review_for_movie(&self, movie: &Movie) -> Result<Vec<Review>> {
        let key = movie.key();
        Ok(self
            .read()?
            .reviews
            .iter()
            .filter(|r| r.movie == key)
            .cloned()
            .collect())
    }

    fn add_genre(&self, genre: Genre) -> Result<()> {
        let mut store = self.write()?;
        if !store.genres.contains(&genre) {
            store.genres.push(genre);
        }
        Ok(())
    }

    fn get_genres(&self) -> Result<Vec<Genre>> {
        Ok(self.read()?.genres.clone())
    }

    fn add_director(&self, director: Director) -> Result<()> {
        let mut store = self.write()?;
        if !store.directors.contains(&director) {
            store.directors.push(director);
        }
        Ok(())
    }

    fn get_director(&self) -> Result<Vec<Director>> {
        Ok(self.read()?.directors.clone())
    }

    fn add_actors(&self, actor: Actor) -> Result<()> {
        let mut store = self.write()?;
        if !store.actors.contains(&actor) {
            store.actors.push(actor);
        }
        Ok(())
    }

    fn get_actors(&self) -> Result<Vec<Actor>> {
        Ok(self.read()?.actors.clone())
    }
}
