use crate::model::*;
use log::{debug, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: {source}")]
    Invalid { row: usize, source: ModelError },
    #[error("cannot hash password for {username}: {source}")]
    Hash {
        username: String,
        source: bcrypt::BcryptError,
    },
}

#[derive(Deserialize)]
struct MovieRecord {
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Year")]
    year: i32,
    #[serde(rename = "Actors")]
    actors: String,
    #[serde(rename = "Director")]
    director: String,
    #[serde(rename = "Genre")]
    genre: String,
    #[serde(rename = "Rating")]
    rating: f32,
    #[serde(rename = "Runtime (Minutes)")]
    runtime: i64,
    #[serde(rename = "Metascore")]
    metascore: String,
    #[serde(rename = "Votes")]
    votes: u64,
    #[serde(rename = "Description")]
    description: String,
}

#[derive(Deserialize)]
struct UserRecord {
    #[allow(dead_code)]
    id: String,
    username: String,
    password: String,
}

/// Parses the movie data file into deduplicated sets of movies, actors,
/// directors and genres.
pub struct MovieFileCsvReader {
    file_name: PathBuf,
    movies: Vec<Movie>,
    actors: BTreeMap<String, Actor>,
    directors: BTreeSet<Director>,
    genres: BTreeSet<Genre>,
    users: Vec<User>,
}

impl MovieFileCsvReader {
    pub fn new<P: AsRef<Path>>(file_name: P) -> MovieFileCsvReader {
        MovieFileCsvReader {
            file_name: file_name.as_ref().to_owned(),
            movies: Vec::new(),
            actors: BTreeMap::new(),
            directors: BTreeSet::new(),
            genres: BTreeSet::new(),
            users: Vec::new(),
        }
    }

    fn open(path: &Path) -> Result<csv::Reader<std::fs::File>, ReaderError> {
        let file = std::fs::File::open(path).map_err(|source| ReaderError::Io {
            path: path.to_owned(),
            source,
        })?;
        Ok(csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file))
    }

    pub fn read_csv_file(&mut self) -> Result<(), ReaderError> {
        let mut reader = Self::open(&self.file_name)?;
        let mut seen = HashSet::new();
        for (index, record) in reader.deserialize::<MovieRecord>().enumerate() {
            // Header is line 1.
            let row = index + 2;
            let record = record?;
            let movie = self
                .movie_from_record(record)
                .map_err(|source| ReaderError::Invalid { row, source })?;
            if seen.insert(movie.key()) {
                self.movies.push(movie);
            } else {
                warn!("skipping duplicate {} on row {}", movie, row);
            }
        }
        debug!(
            "read {} movies from {}",
            self.movies.len(),
            self.file_name.display()
        );
        Ok(())
    }

    fn movie_from_record(&mut self, record: MovieRecord) -> Result<Movie, ModelError> {
        let mut movie = Movie::new(&record.title, record.year)?;
        movie.set_description(&record.description);
        movie.set_runtime_minutes(record.runtime)?;
        movie.set_rating(record.rating);
        movie.metascore = record.metascore.parse().ok();
        movie.num_of_ratings = record.votes;

        let director = Director::new(&record.director);
        if !director.full_name.is_empty() {
            self.directors.insert(director.clone());
            movie.director = Some(director);
        }

        for name in record.actors.split(',').map(str::trim) {
            if !name.is_empty() {
                movie.add_actor(Actor::new(name));
            }
        }
        for actor in movie.actors() {
            self.actors
                .entry(actor.full_name.clone())
                .or_insert_with(|| actor.clone());
        }
        self.record_colleagues(&movie);

        for name in record.genre.split(',').map(str::trim) {
            if !name.is_empty() {
                let genre = Genre::new(name);
                self.genres.insert(genre.clone());
                movie.add_genre(genre);
            }
        }
        Ok(movie)
    }

    fn record_colleagues(&mut self, movie: &Movie) {
        let cast = movie.actors();
        for (i, first) in cast.iter().enumerate() {
            for second in &cast[i + 1..] {
                let mut other = match self.actors.remove(&second.full_name) {
                    Some(actor) => actor,
                    None => continue,
                };
                if let Some(actor) = self.actors.get_mut(&first.full_name) {
                    actor.add_colleague(&mut other);
                }
                self.actors.insert(other.full_name.clone(), other);
            }
        }
    }

    /// Reads `id,username,password` rows, hashing each password with bcrypt.
    pub fn read_users_file<P: AsRef<Path>>(&mut self, path: P, cost: u32) -> Result<(), ReaderError> {
        let mut reader = Self::open(path.as_ref())?;
        for record in reader.deserialize::<UserRecord>() {
            let record = record?;
            let hash = bcrypt::hash(&record.password, cost).map_err(|source| ReaderError::Hash {
                username: record.username.clone(),
                source,
            })?;
            let user = User::new(&record.username, &hash);
            if !self.users.contains(&user) {
                self.users.push(user);
            }
        }
        Ok(())
    }

    pub fn dataset_of_movies(&self) -> &[Movie] {
        &self.movies
    }

    pub fn dataset_of_movies_mut(&mut self) -> &mut [Movie] {
        &mut self.movies
    }

    pub fn dataset_of_actors(&self) -> Vec<&Actor> {
        self.actors.values().collect()
    }

    pub fn dataset_of_directors(&self) -> &BTreeSet<Director> {
        &self.directors
    }

    pub fn dataset_of_genres(&self) -> &BTreeSet<Genre> {
        &self.genres
    }

    pub fn dataset_of_users(&self) -> &[User] {
        &self.users
    }
}
