use crate::model::Movie;
use log::{debug, warn};
use serde::Deserialize;
use std::time::Duration;

pub const PLACEHOLDER_POSTER: &str = "https://via.placeholder.com/300x445?text=No+Poster";
const OMDB_URL: &str = "https://www.omdbapi.com/";

#[derive(Deserialize)]
struct OmdbMovie {
    #[serde(rename = "Poster")]
    poster: Option<String>,
}

/// Looks up poster images on OMDb. Lookups never fail: anything that goes
/// wrong yields `PLACEHOLDER_POSTER`.
pub struct PosterClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl PosterClient {
    pub fn new(api_key: Option<String>) -> PosterClient {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        PosterClient {
            client,
            api_key,
            base_url: OMDB_URL.to_owned(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> PosterClient {
        self.base_url = base_url.to_owned();
        self
    }

    async fn fetch(&self, api_key: &str, movie: &Movie) -> reqwest::Result<Option<String>> {
        let year = movie.release_year().to_string();
        let found: OmdbMovie = self
            .client
            .get(&self.base_url)
            .query(&[("apikey", api_key), ("t", movie.title()), ("y", year.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(found.poster.filter(|url| url.starts_with("http")))
    }

    /// Fills in the poster of every movie that does not have one yet.
    ///
    /// The first failed lookup ends the lookups for this call: the remaining
    /// movies get `PLACEHOLDER_POSTER` without contacting the service.
    pub async fn enrich(&self, movies: &mut [Movie]) {
        let mut api_key = self.api_key.as_deref();
        for movie in movies.iter_mut().filter(|m| m.image.is_empty()) {
            let key = match api_key {
                Some(key) => key,
                None => {
                    movie.image = PLACEHOLDER_POSTER.to_owned();
                    continue;
                }
            };
            movie.image = match self.fetch(key, movie).await {
                Ok(Some(url)) => url,
                Ok(None) => {
                    debug!("no poster for {}", movie);
                    PLACEHOLDER_POSTER.to_owned()
                }
                Err(err) => {
                    warn!("poster lookup for {} failed, skipping the rest: {}", movie, err);
                    api_key = None;
                    PLACEHOLDER_POSTER.to_owned()
                }
            };
        }
    }
}
