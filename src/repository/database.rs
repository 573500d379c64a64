use super::{genre_limit, review_author, Repository, RepositoryError, Result};
use crate::model::*;
use chrono::{DateTime, Utc};
use log::debug;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql, Transaction};
use std::path::Path;

pub type ConnectionPool = Pool<SqliteConnectionManager>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_name TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS directors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS genres (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS actors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    full_name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS movies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    release_year INTEGER NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    director_id INTEGER REFERENCES directors(id),
    runtime INTEGER,
    rating REAL,
    metascore INTEGER,
    num_of_ratings INTEGER NOT NULL DEFAULT 0,
    image_hyperlink TEXT NOT NULL DEFAULT '',
    UNIQUE (title, release_year)
);
CREATE TABLE IF NOT EXISTS reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    movie_id INTEGER NOT NULL REFERENCES movies(id),
    rating INTEGER NOT NULL,
    review_text TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS movie_actors (
    movie_id INTEGER NOT NULL REFERENCES movies(id),
    actor_id INTEGER NOT NULL REFERENCES actors(id),
    PRIMARY KEY (movie_id, actor_id)
);
CREATE TABLE IF NOT EXISTS movie_genres (
    movie_id INTEGER NOT NULL REFERENCES movies(id),
    genre_id INTEGER NOT NULL REFERENCES genres(id),
    PRIMARY KEY (movie_id, genre_id)
);
";

const MOVIE_COLUMNS: &str = "m.title, m.release_year, m.description, d.name, m.runtime, \
     m.rating, m.metascore, m.num_of_ratings, m.image_hyperlink";

const REVIEW_COLUMNS: &str = "m.title, m.release_year, r.review_text, r.rating, r.timestamp, u.user_name";

/// SQLite-backed repository. Every call checks a connection out of the
/// pool; writes run in a transaction that rolls back unless committed.
pub struct DatabaseRepository {
    pool: ConnectionPool,
}

/// Registers `fold(text)`, which lowercases with Rust's full Unicode rules.
/// SQLite's own `lower`, `NOCASE` and `LIKE` only fold ASCII.
fn init_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;
    conn.create_scalar_function(
        "fold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<String>(0)?.to_lowercase()),
    )
}

impl DatabaseRepository {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<DatabaseRepository> {
        let manager = SqliteConnectionManager::file(path).with_init(init_connection);
        DatabaseRepository::new(Pool::builder().max_size(8).build(manager)?)
    }

    /// A private in-memory database. The pool holds a single connection so
    /// that every call sees the same data.
    pub fn in_memory() -> Result<DatabaseRepository> {
        let manager = SqliteConnectionManager::memory().with_init(init_connection);
        DatabaseRepository::new(Pool::builder().max_size(1).build(manager)?)
    }

    /// `pool` must set its connections up with `init_connection`.
    fn new(pool: ConnectionPool) -> Result<DatabaseRepository> {
        pool.get()?.execute_batch(SCHEMA)?;
        Ok(DatabaseRepository { pool })
    }

    /// Runs `f` in a transaction. It is committed if `f` succeeds and rolled
    /// back when dropped otherwise.
    fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    fn movies_by_ids(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Movie>> {
        let conn = self.pool.get()?;
        let ids = query_ids(&conn, sql, params)?;
        ids.into_iter()
            .filter_map(|id| load_movie(&conn, id).transpose())
            .collect()
    }
}

fn query_ids(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(params, |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

fn query_names(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let names = stmt
        .query_map(params, |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

/// Lowercases `needle` and escapes `%`, `_` and `\` so it only ever matches
/// literally in a `fold(column) LIKE ... ESCAPE '\'` pattern.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

struct MovieRow {
    title: String,
    release_year: i32,
    description: String,
    director: Option<String>,
    runtime: Option<i64>,
    rating: Option<f64>,
    metascore: Option<u32>,
    num_of_ratings: i64,
    image: String,
}

impl MovieRow {
    fn from_row(row: &Row) -> rusqlite::Result<MovieRow> {
        Ok(MovieRow {
            title: row.get(0)?,
            release_year: row.get(1)?,
            description: row.get(2)?,
            director: row.get(3)?,
            runtime: row.get(4)?,
            rating: row.get(5)?,
            metascore: row.get(6)?,
            num_of_ratings: row.get(7)?,
            image: row.get(8)?,
        })
    }
}

struct ReviewRow {
    title: String,
    release_year: u16,
    text: String,
    rating: i64,
    timestamp: String,
    user_name: String,
}

impl ReviewRow {
    fn from_row(row: &Row) -> rusqlite::Result<ReviewRow> {
        Ok(ReviewRow {
            title: row.get(0)?,
            release_year: row.get(1)?,
            text: row.get(2)?,
            rating: row.get(3)?,
            timestamp: row.get(4)?,
            user_name: row.get(5)?,
        })
    }

    fn into_review(self) -> Result<Review> {
        let key = MovieKey {
            title: self.title,
            release_year: self.release_year,
        };
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)?.with_timezone(&Utc);
        let mut review = Review::new(key, &self.text, self.rating, timestamp)?;
        review.assign_author(&self.user_name);
        Ok(review)
    }
}

fn query_reviews(conn: &Connection, filter: &str, params: &[&dyn ToSql]) -> Result<Vec<Review>> {
    let sql = format!(
        "SELECT {} FROM reviews r \
         JOIN movies m ON m.id = r.movie_id \
         JOIN users u ON u.id = r.user_id \
         {} ORDER BY r.id",
        REVIEW_COLUMNS, filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, ReviewRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(ReviewRow::into_review).collect()
}

fn load_movie(conn: &Connection, id: i64) -> Result<Option<Movie>> {
    let sql = format!(
        "SELECT {} FROM movies m LEFT JOIN directors d ON d.id = m.director_id WHERE m.id = ?1",
        MOVIE_COLUMNS
    );
    let row = match conn
        .query_row(&sql, params![id], MovieRow::from_row)
        .optional()?
    {
        Some(row) => row,
        None => return Ok(None),
    };

    let mut movie = Movie::new(&row.title, row.release_year)?;
    movie.set_description(&row.description);
    movie.director = row.director.as_deref().map(Director::new);
    if let Some(runtime) = row.runtime {
        movie.set_runtime_minutes(runtime)?;
    }
    if let Some(rating) = row.rating {
        movie.set_rating(rating as f32);
    }
    movie.metascore = row.metascore;
    movie.num_of_ratings = row.num_of_ratings as u64;
    movie.image = row.image;

    for name in query_names(
        conn,
        "SELECT a.full_name FROM movie_actors ma JOIN actors a ON a.id = ma.actor_id \
         WHERE ma.movie_id = ?1 ORDER BY ma.rowid",
        &[&id],
    )? {
        movie.add_actor(Actor::new(&name));
    }
    for name in query_names(
        conn,
        "SELECT g.name FROM movie_genres mg JOIN genres g ON g.id = mg.genre_id \
         WHERE mg.movie_id = ?1 ORDER BY mg.rowid",
        &[&id],
    )? {
        movie.add_genre(Genre::new(&name));
    }
    for review in query_reviews(conn, "WHERE r.movie_id = ?1", &[&id])? {
        movie.add_review(review);
    }
    Ok(Some(movie))
}

fn movie_id(conn: &Connection, key: &MovieKey) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM movies WHERE title = ?1 AND release_year = ?2",
            params![key.title, key.release_year],
            |row| row.get(0),
        )
        .optional()?)
}

fn user_id(conn: &Connection, username: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM users WHERE user_name = ?1",
            params![username],
            |row| row.get(0),
        )
        .optional()?)
}

fn upsert_name(conn: &Connection, table: &str, column: &str, name: &str) -> Result<i64> {
    conn.execute(
        &format!("INSERT OR IGNORE INTO {} ({}) VALUES (?1)", table, column),
        params![name],
    )?;
    Ok(conn.query_row(
        &format!("SELECT id FROM {} WHERE {} = ?1", table, column),
        params![name],
        |row| row.get(0),
    )?)
}

impl Repository for DatabaseRepository {
    fn add_user(&self, user: User) -> Result<bool> {
        self.write(|tx| {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO users (user_name, password) VALUES (?1, ?2)",
                params![user.username, user.password],
            )?;
            Ok(inserted == 1)
        })
    }

    fn get_user(&self, username: &str) -> Result<Option<User>> {
        let conn = self.pool.get()?;
        let username = normalize_username(username);
        let row: Option<(i64, String, String)> = conn
            .query_row(
                "SELECT id, user_name, password FROM users WHERE user_name = ?1",
                params![username],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let (id, user_name, password) = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        let mut user = User::new(&user_name, &password);
        for review in query_reviews(&conn, "WHERE r.user_id = ?1", &[&id])? {
            user.add_review(review);
        }
        Ok(Some(user))
    }

    fn add_movie(&self, movie: Movie) -> Result<()> {
        self.write(|tx| {
            let director_id = match &movie.director {
                Some(director) => Some(upsert_name(tx, "directors", "name", &director.full_name)?),
                None => None,
            };
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO movies (title, release_year, description, director_id, \
                 runtime, rating, metascore, num_of_ratings, image_hyperlink) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    movie.title(),
                    movie.release_year(),
                    movie.description(),
                    director_id,
                    movie.runtime_minutes(),
                    movie.rating().map(f64::from),
                    movie.metascore,
                    movie.num_of_ratings as i64,
                    movie.image,
                ],
            )?;
            if inserted == 0 {
                debug!("{} is already stored", movie);
                return Ok(());
            }
            let id = tx.last_insert_rowid();
            for actor in movie.actors() {
                let actor_id = upsert_name(tx, "actors", "full_name", &actor.full_name)?;
                tx.execute(
                    "INSERT OR IGNORE INTO movie_actors (movie_id, actor_id) VALUES (?1, ?2)",
                    params![id, actor_id],
                )?;
            }
            for genre in movie.genres() {
                let genre_id = upsert_name(tx, "genres", "name", &genre.name)?;
                tx.execute(
                    "INSERT OR IGNORE INTO movie_genres (movie_id, genre_id) VALUES (?1, ?2)",
                    params![id, genre_id],
                )?;
            }
            Ok(())
        })
    }

    fn get_movie(&self, key: &Movie) -> Result<Option<Movie>> {
        let conn = self.pool.get()?;
        match movie_id(&conn, &key.key())? {
            Some(id) => load_movie(&conn, id),
            None => Ok(None),
        }
    }

    fn get_movie_by_title(&self, title: &str) -> Result<Option<Movie>> {
        let conn = self.pool.get()?;
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM movies WHERE fold(title) = ?1 ORDER BY id LIMIT 1",
                params![title.trim().to_lowercase()],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => load_movie(&conn, id),
            None => Ok(None),
        }
    }

    fn get_movies_by_title(&self, title: &str) -> Result<Vec<Movie>> {
        self.movies_by_ids(
            "SELECT id FROM movies WHERE fold(title) LIKE ?1 ESCAPE '\\' ORDER BY id",
            &[&like_pattern(title)],
        )
    }

    fn get_movies_by_director(&self, director: &str) -> Result<Vec<Movie>> {
        self.movies_by_ids(
            "SELECT m.id FROM movies m JOIN directors d ON d.id = m.director_id \
             WHERE fold(d.name) LIKE ?1 ESCAPE '\\' ORDER BY m.id",
            &[&like_pattern(director)],
        )
    }

    fn get_movies_by_actor(&self, actor: &str) -> Result<Vec<Movie>> {
        self.movies_by_ids(
            "SELECT DISTINCT ma.movie_id FROM movie_actors ma JOIN actors a ON a.id = ma.actor_id \
             WHERE fold(a.full_name) LIKE ?1 ESCAPE '\\' ORDER BY ma.movie_id",
            &[&like_pattern(actor)],
        )
    }

    fn get_number_of_movies(&self) -> Result<usize> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM movies", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn get_movies_by_release(&self) -> Result<Vec<Movie>> {
        self.movies_by_ids(
            "SELECT id FROM movies ORDER BY release_year DESC, id ASC",
            &[],
        )
    }

    fn get_10_movies(&self) -> Result<Vec<Movie>> {
        self.movies_by_ids(
            "SELECT id FROM movies ORDER BY rating DESC, id ASC LIMIT 10",
            &[],
        )
    }

    fn get_10_movies_genre(&self, genre: &Genre) -> Result<Vec<Movie>> {
        let limit = genre_limit(genre) as i64;
        self.movies_by_ids(
            "SELECT mg.movie_id FROM movie_genres mg JOIN genres g ON g.id = mg.genre_id \
             WHERE g.name = ?1 ORDER BY mg.movie_id ASC LIMIT ?2",
            &[&genre.name, &limit],
        )
    }

    fn get_all_movies_genre(&self, genre: &Genre) -> Result<Vec<Movie>> {
        self.movies_by_ids(
            "SELECT mg.movie_id FROM movie_genres mg JOIN genres g ON g.id = mg.genre_id \
             WHERE g.name = ?1 ORDER BY mg.movie_id ASC",
            &[&genre.name],
        )
    }

    fn add_review(&self, review: Review) -> Result<()> {
        let author = review_author(&review)?;
        self.write(|tx| {
            let user_id = user_id(tx, author)?
                .ok_or_else(|| RepositoryError::Unattached(format!("unknown user {}", author)))?;
            let movie_id = movie_id(tx, &review.movie)?.ok_or_else(|| {
                RepositoryError::Unattached(format!("unknown movie {}", review.movie))
            })?;
            let timestamp = review.timestamp.to_rfc3339();
            let existing: i64 = tx.query_row(
                "SELECT COUNT(*) FROM reviews WHERE movie_id = ?1 \
                 AND review_text = ?2 AND rating = ?3 AND timestamp = ?4",
                params![movie_id, review.text, review.rating(), timestamp],
                |row| row.get(0),
            )?;
            if existing > 0 {
                return Ok(());
            }
            tx.execute(
                "INSERT INTO reviews (user_id, movie_id, rating, review_text, timestamp) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user_id, movie_id, review.rating(), review.text, timestamp],
            )?;
            Ok(())
        })
    }

    fn get_reviews(&self) -> Result<Vec<Review>> {
        let conn = self.pool.get()?;
        query_reviews(&conn, "", &[])
    }

    fn get_review_for_movie(&self, movie: &Movie) -> Result<Vec<Review>> {
        let conn = self.pool.get()?;
        query_reviews(
            &conn,
            "WHERE m.title = ?1 AND m.release_year = ?2",
            &[&movie.title(), &movie.release_year()],
        )
    }

    fn add_genre(&self, genre: Genre) -> Result<()> {
        self.write(|tx| upsert_name(tx, "genres", "name", &genre.name).map(|_| ()))
    }

    fn get_genres(&self) -> Result<Vec<Genre>> {
        let conn = self.pool.get()?;
        let names = query_names(&conn, "SELECT name FROM genres ORDER BY id", &[])?;
        Ok(names.iter().map(|name| Genre::new(name)).collect())
    }

    fn add_director(&self, director: Director) -> Result<()> {
        self.write(|tx| upsert_name(tx, "directors", "name", &director.full_name).map(|_| ()))
    }

    fn get_director(&self) -> Result<Vec<Director>> {
        let conn = self.pool.get()?;
        let names = query_names(&conn, "SELECT name FROM directors ORDER BY id", &[])?;
        Ok(names.iter().map(|name| Director::new(name)).collect())
    }

    fn add_actors(&self, actor: Actor) -> Result<()> {
        self.write(|tx| upsert_name(tx, "actors", "full_name", &actor.full_name).map(|_| ()))
    }

    /// Colleagues are everyone an actor shares a movie with.
    fn get_actors(&self) -> Result<Vec<Actor>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT id, full_name FROM actors ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut actors = Vec::with_capacity(rows.len());
        for (id, name) in rows {
            let mut actor = Actor::new(&name);
            for colleague in query_names(
                &conn,
                "SELECT DISTINCT a.full_name FROM movie_actors mine \
                 JOIN movie_actors theirs ON theirs.movie_id = mine.movie_id \
                 JOIN actors a ON a.id = theirs.actor_id \
                 WHERE mine.actor_id = ?1 AND theirs.actor_id != ?1 ORDER BY a.id",
                &[&id],
            )? {
                actor.add_colleague(&mut Actor::new(&colleague));
            }
            actors.push(actor);
        }
        Ok(actors)
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;

    fn repo() -> DatabaseRepository {
        contract::populated(DatabaseRepository::in_memory().unwrap())
    }

    #[test]
    fn movie_by_title_round_trips() {
        contract::movie_by_title_round_trips(&repo());
    }

    #[test]
    fn get_movie_by_key() {
        contract::get_movie_by_key(&repo());
    }

    #[test]
    fn counts() {
        contract::counts(&repo());
    }

    #[test]
    fn adding_a_movie_twice_keeps_one() {
        contract::adding_a_movie_twice_keeps_one(&repo());
    }

    #[test]
    fn top_ten_by_rating() {
        contract::top_ten_by_rating(&repo());
    }

    #[test]
    fn by_release_newest_first() {
        contract::by_release_newest_first(&repo());
    }

    #[test]
    fn genre_limits() {
        contract::genre_limits(&repo());
    }

    #[test]
    fn substring_searches() {
        contract::substring_searches(&repo());
    }

    #[test]
    fn users() {
        contract::users(&DatabaseRepository::in_memory().unwrap());
    }

    #[test]
    fn reviews_attach_both_ways() {
        contract::reviews_attach_both_ways(&repo());
    }

    #[test]
    fn equal_reviews_are_stored_once() {
        contract::equal_reviews_are_stored_once(&repo());
    }

    #[test]
    fn case_folding_is_unicode_aware() {
        contract::case_folding_is_unicode_aware(&repo());
    }

    #[test]
    fn thousand_movies() {
        contract::thousand_movies(&DatabaseRepository::in_memory().unwrap());
    }

    #[test]
    fn unattached_reviews_are_rejected() {
        contract::unattached_reviews_are_rejected(&repo());
    }

    #[test]
    fn actors_are_deduplicated() {
        contract::actors_are_deduplicated(&repo());
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Brad"), "%brad%");
        assert_eq!(like_pattern("MISÉRABLES"), "%misérables%");
        assert_eq!(like_pattern("100%_\\"), "%100\\%\\_\\\\%");
    }

    #[test]
    fn failed_write_rolls_back() {
        let repo = DatabaseRepository::in_memory().unwrap();
        let result: Result<()> = repo.write(|tx| {
            upsert_name(tx, "genres", "name", "Noir")?;
            Err(RepositoryError::Unattached("abort".to_owned()))
        });
        assert!(result.is_err());
        assert!(repo.get_genres().unwrap().is_empty());
    }

    #[test]
    fn schema_has_association_tables() {
        let repo = DatabaseRepository::in_memory().unwrap();
        let conn = repo.pool.get().unwrap();
        let tables = query_names(
            &conn,
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
            &[],
        )
        .unwrap();
        assert_eq!(
            tables,
            vec![
                "actors",
                "directors",
                "genres",
                "movie_actors",
                "movie_genres",
                "movies",
                "reviews",
                "users"
            ]
        );
    }

    #[test]
    fn file_database_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movies.db");
        {
            let repo = DatabaseRepository::open(&path).unwrap();
            repo.add_movie(Movie::new("Heat", 1995).unwrap()).unwrap();
        }
        let repo = DatabaseRepository::open(&path).unwrap();
        assert_eq!(repo.get_number_of_movies().unwrap(), 1);
    }
}
