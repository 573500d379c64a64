mod database;
mod memory;

pub use database::DatabaseRepository;
pub use memory::MemoryRepository;

use crate::model::*;
use crate::reader::MovieFileCsvReader;
use log::info;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("review is not attached: {0}")]
    Unattached(String),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("repository lock poisoned")]
    Poisoned,
    #[error("stored row is invalid: {0}")]
    Model(#[from] ModelError),
    #[error("stored timestamp is invalid: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Storage for the catalogue. "Not found" is `Ok(None)` or an empty `Vec`,
/// never an error.
pub trait Repository: Send + Sync {
    /// Returns `false` without storing anything if the username is taken.
    fn add_user(&self, user: User) -> Result<bool>;
    fn get_user(&self, username: &str) -> Result<Option<User>>;

    fn add_movie(&self, movie: Movie) -> Result<()>;
    /// Looks up the stored movie with the same title and release year as `key`.
    fn get_movie(&self, key: &Movie) -> Result<Option<Movie>>;
    fn get_movie_by_title(&self, title: &str) -> Result<Option<Movie>>;
    fn get_movies_by_title(&self, title: &str) -> Result<Vec<Movie>>;
    fn get_movies_by_director(&self, director: &str) -> Result<Vec<Movie>>;
    fn get_movies_by_actor(&self, actor: &str) -> Result<Vec<Movie>>;
    fn get_number_of_movies(&self) -> Result<usize>;
    /// All movies, newest release first.
    fn get_movies_by_release(&self) -> Result<Vec<Movie>>;
    /// The ten best rated movies, best first.
    fn get_10_movies(&self) -> Result<Vec<Movie>>;
    /// The first `genre_limit(genre)` movies carrying `genre`, in insertion order.
    fn get_10_movies_genre(&self, genre: &Genre) -> Result<Vec<Movie>>;
    fn get_all_movies_genre(&self, genre: &Genre) -> Result<Vec<Movie>>;

    /// Stores a review written by a known user about a known movie and
    /// attaches it to both. Fails with `RepositoryError::Unattached`,
    /// leaving the repository unchanged, otherwise.
    fn add_review(&self, review: Review) -> Result<()>;
    fn get_reviews(&self) -> Result<Vec<Review>>;
    fn get_review_for_movie(&self, movie: &Movie) -> Result<Vec<Review>>;

    fn add_genre(&self, genre: Genre) -> Result<()>;
    fn get_genres(&self) -> Result<Vec<Genre>>;
    fn add_director(&self, director: Director) -> Result<()>;
    fn get_director(&self) -> Result<Vec<Director>>;
    fn add_actors(&self, actor: Actor) -> Result<()>;
    fn get_actors(&self) -> Result<Vec<Actor>>;
}

/// How many movies a genre listing shows on the home page.
// Western and Musical listings are capped at five.
pub fn genre_limit(genre: &Genre) -> usize {
    match genre.name.as_str() {
        "Western" | "Musical" => 5,
        _ => 10,
    }
}

fn review_author(review: &Review) -> Result<&str> {
    review
        .user()
        .ok_or_else(|| RepositoryError::Unattached("review has no author".to_owned()))
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Loads everything a reader has parsed into `repo`.
pub fn populate(repo: &dyn Repository, reader: &MovieFileCsvReader) -> Result<()> {
    for director in reader.dataset_of_directors() {
        repo.add_director(director.clone())?;
    }
    for genre in reader.dataset_of_genres() {
        repo.add_genre(genre.clone())?;
    }
    for actor in reader.dataset_of_actors() {
        repo.add_actors(actor.clone())?;
    }
    for movie in reader.dataset_of_movies() {
        repo.add_movie(movie.clone())?;
    }
    for user in reader.dataset_of_users() {
        repo.add_user(user.clone())?;
    }
    info!(
        "populated repository with {} movies, {} genres, {} actors, {} directors, {} users",
        reader.dataset_of_movies().len(),
        reader.dataset_of_genres().len(),
        reader.dataset_of_actors().len(),
        reader.dataset_of_directors().len(),
        reader.dataset_of_users().len(),
    );
    Ok(())
}

/// Behaviour both backends must share, run against each of them.
#[cfg(test)]
pub(crate) mod contract {
    use super::*;
    use chrono::Utc;
    use std::io::Write;

    pub fn fixture_reader() -> MovieFileCsvReader {
        let mut reader = MovieFileCsvReader::new(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/data/movies.csv"
        ));
        reader.read_csv_file().unwrap();
        reader
    }

    pub fn populated<R: Repository>(repo: R) -> R {
        populate(&repo, &fixture_reader()).unwrap();
        repo
    }

    pub fn movie_by_title_round_trips(repo: &dyn Repository) {
        for movie in fixture_reader().dataset_of_movies() {
            let found = repo.get_movie_by_title(movie.title()).unwrap().unwrap();
            assert_eq!(&found, movie);
            assert_eq!(found.genres(), movie.genres());
            assert_eq!(found.actors(), movie.actors());
            assert_eq!(found.director, movie.director);
        }
        let shouting = repo.get_movie_by_title("INCEPTION").unwrap().unwrap();
        assert_eq!(shouting.title(), "Inception");
        assert_eq!(repo.get_movie_by_title("Incept").unwrap(), None);
    }

    pub fn get_movie_by_key(repo: &dyn Repository) {
        let key = Movie::new("Prometheus", 2012).unwrap();
        let movie = repo.get_movie(&key).unwrap().unwrap();
        assert_eq!(movie.rating(), Some(7.0));
        assert_eq!(movie.runtime_minutes(), Some(124));
        assert_eq!(movie.director, Some(Director::new("Ridley Scott")));
        assert_eq!(movie.metascore, Some(65));
        assert_eq!(movie.num_of_ratings, 485820);
        assert_eq!(
            repo.get_movie(&Movie::new("Prometheus", 2013).unwrap()).unwrap(),
            None
        );
    }

    pub fn counts(repo: &dyn Repository) {
        assert_eq!(repo.get_number_of_movies().unwrap(), 25);
        assert_eq!(repo.get_genres().unwrap().len(), 17);
        assert_eq!(repo.get_director().unwrap().len(), 19);
    }

    pub fn adding_a_movie_twice_keeps_one(repo: &dyn Repository) {
        let before = repo.get_number_of_movies().unwrap();
        let movie = Movie::new("Inception", 2010).unwrap();
        repo.add_movie(movie).unwrap();
        assert_eq!(repo.get_number_of_movies().unwrap(), before);

        let mut fresh = Movie::new("Moana", 2016).unwrap();
        fresh.add_genre(Genre::new("Animation"));
        fresh.add_actor(Actor::new("Auli'i Cravalho"));
        repo.add_movie(fresh.clone()).unwrap();
        assert_eq!(repo.get_number_of_movies().unwrap(), before + 1);
        assert_eq!(repo.get_movie(&fresh).unwrap(), Some(fresh));
    }

    pub fn top_ten_by_rating(repo: &dyn Repository) {
        let movies = repo.get_10_movies().unwrap();
        assert_eq!(movies.len(), 10);
        assert_eq!(movies[0].title(), "The Dark Knight");
        for pair in movies.windows(2) {
            assert!(pair[0].rating() >= pair[1].rating());
        }
    }

    pub fn by_release_newest_first(repo: &dyn Repository) {
        let movies = repo.get_movies_by_release().unwrap();
        assert_eq!(movies.len(), 25);
        assert_eq!(movies.last().unwrap().title(), "The Prestige");
        for pair in movies.windows(2) {
            assert!(pair[0].release_year() >= pair[1].release_year());
        }
    }

    pub fn genre_limits(repo: &dyn Repository) {
        let western = Genre::new("Western");
        let westerns = repo.get_10_movies_genre(&western).unwrap();
        assert_eq!(westerns.len(), 5);
        assert_eq!(westerns[0].title(), "Django Unchained");
        assert!(westerns.iter().all(|m| m.genres().contains(&western)));
        assert_eq!(repo.get_all_movies_genre(&western).unwrap().len(), 7);

        let action = Genre::new("Action");
        let actions = repo.get_10_movies_genre(&action).unwrap();
        assert_eq!(actions.len(), 10);
        assert!(!actions.iter().any(|m| m.title() == "Deadpool"));
        assert_eq!(repo.get_all_movies_genre(&action).unwrap().len(), 11);

        let musical = Genre::new("Musical");
        assert_eq!(repo.get_10_movies_genre(&musical).unwrap().len(), 2);

        let unknown = Genre::new("Documentary");
        assert!(repo.get_10_movies_genre(&unknown).unwrap().is_empty());
        assert!(repo.get_all_movies_genre(&unknown).unwrap().is_empty());
    }

    pub fn substring_searches(repo: &dyn Repository) {
        let nolan = repo.get_movies_by_director("christopher nolan").unwrap();
        assert_eq!(nolan.len(), 5);
        for movie in &nolan {
            assert_eq!(movie.director, Some(Director::new("Christopher Nolan")));
        }

        let damon = repo.get_movies_by_actor("Matt Damon").unwrap();
        let titles: Vec<_> = damon.iter().map(|m| m.title()).collect();
        assert_eq!(titles, vec!["True Grit", "The Martian", "Jason Bourne"]);

        assert!(repo.get_movies_by_actor("Brad Pitt").unwrap().is_empty());
        let brad = repo.get_movies_by_actor("brad").unwrap();
        let titles: Vec<_> = brad.iter().map(|m| m.title()).collect();
        assert_eq!(titles, vec!["Guardians of the Galaxy"]);

        let chris = repo.get_movies_by_actor("CHRIS").unwrap();
        let titles: Vec<_> = chris.iter().map(|m| m.title()).collect();
        assert_eq!(
            titles,
            vec![
                "Guardians of the Galaxy",
                "The Dark Knight",
                "The Prestige",
                "The Dark Knight Rises",
                "Django Unchained",
                "The Magnificent Seven",
                "Into the Woods"
            ]
        );
        for (needle, movies) in &[("brad", &brad), ("chris", &chris)] {
            for movie in movies.iter() {
                assert!(movie
                    .actors()
                    .iter()
                    .any(|a| a.full_name.to_lowercase().contains(needle)));
            }
        }

        let dark = repo.get_movies_by_title("dark knight").unwrap();
        assert_eq!(dark.len(), 2);
        assert!(repo.get_movies_by_title("100%").unwrap().is_empty());
    }

    pub fn case_folding_is_unicode_aware(repo: &dyn Repository) {
        let found = repo.get_movie_by_title("LES MISÉRABLES").unwrap().unwrap();
        assert_eq!(found.title(), "Les Misérables");

        let matches = repo.get_movies_by_title("MISÉRABLES").unwrap();
        let titles: Vec<_> = matches.iter().map(|m| m.title()).collect();
        assert_eq!(titles, vec!["Les Misérables"]);
    }

    /// A movie file with `count` rows drawn from 21 genres, 300 directors
    /// and 500 actors.
    pub fn generated_movie_file(count: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "Rank,Title,Genre,Description,Director,Actors,Year,Runtime (Minutes),Rating,Votes,Revenue (Millions),Metascore"
        )
        .unwrap();
        for i in 0..count {
            writeln!(
                file,
                "{},Movie {},\"Drama,Genre {}\",\"A film, numbered.\",Director {},\"Actor {}, Actor {}\",{},100,{}.5,1000,1.0,50",
                i + 1,
                i,
                i % 20,
                i % 300,
                i % 500,
                (i + 1) % 500,
                1950 + i % 70,
                i % 10
            )
            .unwrap();
        }
        file.flush().unwrap();
        file
    }

    pub fn thousand_movies(repo: &dyn Repository) {
        let file = generated_movie_file(1000);
        let mut reader = MovieFileCsvReader::new(file.path());
        reader.read_csv_file().unwrap();
        populate(repo, &reader).unwrap();

        assert_eq!(repo.get_number_of_movies().unwrap(), 1000);
        assert_eq!(repo.get_genres().unwrap().len(), 21);
        assert_eq!(repo.get_director().unwrap().len(), 300);
        assert_eq!(repo.get_actors().unwrap().len(), 500);

        populate(repo, &reader).unwrap();
        assert_eq!(repo.get_number_of_movies().unwrap(), 1000);
        assert_eq!(repo.get_genres().unwrap().len(), 21);
    }

    pub fn users(repo: &dyn Repository) {
        assert!(repo.add_user(User::new("Dave", "123456789")).unwrap());
        assert!(!repo.add_user(User::new("dave", "other")).unwrap());
        let dave = repo.get_user("dave").unwrap().unwrap();
        assert_eq!(dave, User::new("dave", "123456789"));
        assert_eq!(dave.password, "123456789");
        assert_eq!(repo.get_user(" DAVE").unwrap().unwrap().username, "dave");
        assert_eq!(repo.get_user("prince").unwrap(), None);
    }

    pub fn reviews_attach_both_ways(repo: &dyn Repository) {
        repo.add_user(User::new("dave", "pw")).unwrap();
        let mut user = repo.get_user("dave").unwrap().unwrap();
        let mut movie = repo.get_movie_by_title("Inception").unwrap().unwrap();
        let review = make_review("Dreamy", &mut user, &mut movie, 9, Utc::now()).unwrap();

        repo.add_review(review.clone()).unwrap();
        repo.add_review(review.clone()).unwrap();

        assert_eq!(repo.get_reviews().unwrap(), vec![review.clone()]);
        assert_eq!(repo.get_review_for_movie(&movie).unwrap(), vec![review.clone()]);
        let stored_movie = repo.get_movie(&movie).unwrap().unwrap();
        assert_eq!(stored_movie.reviews(), &[review.clone()]);
        let stored_user = repo.get_user("dave").unwrap().unwrap();
        assert_eq!(stored_user.reviews(), &[review.clone()]);
        assert_eq!(stored_user.reviews()[0].user(), Some("dave"));

        let other = repo.get_movie_by_title("Prometheus").unwrap().unwrap();
        assert!(repo.get_review_for_movie(&other).unwrap().is_empty());
    }

    pub fn equal_reviews_are_stored_once(repo: &dyn Repository) {
        repo.add_user(User::new("dave", "pw")).unwrap();
        repo.add_user(User::new("erin", "pw")).unwrap();
        let mut dave = repo.get_user("dave").unwrap().unwrap();
        let mut erin = repo.get_user("erin").unwrap().unwrap();
        let mut movie = repo.get_movie_by_title("Inception").unwrap().unwrap();
        let at = Utc::now();
        let first = make_review("Dreamy", &mut dave, &mut movie, 9, at).unwrap();
        let second = make_review("Dreamy", &mut erin, &mut movie, 9, at).unwrap();
        assert_eq!(first, second);

        repo.add_review(first).unwrap();
        repo.add_review(second).unwrap();

        let reviews = repo.get_reviews().unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].user(), Some("dave"));
        assert_eq!(repo.get_movie(&movie).unwrap().unwrap().reviews().len(), 1);
        assert!(repo.get_user("erin").unwrap().unwrap().reviews().is_empty());
    }

    pub fn unattached_reviews_are_rejected(repo: &dyn Repository) {
        let movie = repo.get_movie_by_title("Inception").unwrap().unwrap();

        let anonymous = Review::new(movie.key(), "Who wrote this", 3, Utc::now()).unwrap();
        assert!(matches!(
            repo.add_review(anonymous),
            Err(RepositoryError::Unattached(_))
        ));

        let mut ghost = User::new("ghost", "pw");
        let mut copy = movie.clone();
        let review = make_review("Boo", &mut ghost, &mut copy, 5, Utc::now()).unwrap();
        assert!(matches!(
            repo.add_review(review),
            Err(RepositoryError::Unattached(_))
        ));

        repo.add_user(User::new("dave", "pw")).unwrap();
        let mut dave = repo.get_user("dave").unwrap().unwrap();
        let mut unknown = Movie::new("Not Real", 2020).unwrap();
        let review = make_review("Huh", &mut dave, &mut unknown, 5, Utc::now()).unwrap();
        assert!(matches!(
            repo.add_review(review),
            Err(RepositoryError::Unattached(_))
        ));

        assert!(repo.get_reviews().unwrap().is_empty());
        assert!(repo.get_user("dave").unwrap().unwrap().reviews().is_empty());
    }

    pub fn actors_are_deduplicated(repo: &dyn Repository) {
        let actors = repo.get_actors().unwrap();
        let mut names: Vec<_> = actors.iter().map(|a| a.full_name.clone()).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);

        let bale = actors
            .iter()
            .find(|a| a.full_name == "Christian Bale")
            .unwrap();
        assert!(bale.worked_with(&Actor::new("Michael Caine")));
        assert!(!bale.worked_with(&Actor::new("Matt Damon")));

        repo.add_actors(Actor::new("Christian Bale")).unwrap();
        assert_eq!(repo.get_actors().unwrap().len(), total);
    }
}
