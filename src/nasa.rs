//! Minimal client for the api.nasa.gov endpoints the frame consumes.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::Error;

pub const BASE_URL: &str = "https://api.nasa.gov";

#[derive(Debug, Clone)]
pub struct NasaApi {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl NasaApi {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// GET `path` with the API key and `params` as an encoded query string.
    fn request(&self, path: &str, params: &[(&str, String)]) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        // the key never reaches the logs; only the path and extra params do
        debug!(base = %self.base_url, path, ?params, "GET");
        let response = self
            .request(path, params)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("request to {path} failed"))?
            .error_for_status()
            .map_err(reqwest::Error::without_url)?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("unexpected response from {path}"))
    }
}

/// Astronomy Picture Of the Day.
#[derive(Debug, Clone)]
pub struct ApodApi {
    api: NasaApi,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ApodEntry {
    pub media_type: String,
    pub url: String,
}

impl ApodApi {
    const PATH: &'static str = "/planetary/apod";

    pub fn new(api: NasaApi) -> Self {
        Self { api }
    }

    pub fn client(&self) -> &reqwest::Client {
        self.api.client()
    }

    pub async fn latest(&self) -> Result<ApodEntry> {
        self.api.get_json(Self::PATH, &[]).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rover {
    Curiosity,
    Perseverance,
}

impl Rover {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Curiosity => "curiosity",
            Self::Perseverance => "perseverance",
        }
    }

    pub fn default_camera(&self) -> &'static str {
        match self {
            Self::Curiosity => "NAVCAM",
            Self::Perseverance => "MCZ_LEFT",
        }
    }

    /// Whether an image is worth downloading, judged from its file name.
    pub fn wants_image(&self, img_src: &str) -> bool {
        let name = file_name(img_src);
        match self {
            // Cxx and Exx mastcam products are the interesting ones.
            Self::Curiosity => {
                matches!(name.get(22..23), Some("C") | Some("E")) || name.contains("NCAM")
            }
            // EBY frames with no filter (0 or 7 at the filter position).
            Self::Perseverance => {
                name.contains("EBY")
                    && matches!(name.get(2..3), Some("0") | Some("7"))
                    && !name.contains("CAM01000")
            }
        }
    }

    /// The listing may point at a scaled-down copy; derive the full-size URL.
    pub fn full_res_url(&self, img_src: &str) -> String {
        match self {
            Self::Curiosity => img_src.to_string(),
            Self::Perseverance => img_src.replace("_1200.jpg", ".png"),
        }
    }
}

impl fmt::Display for Rover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rover {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidRoverName(name.to_string()));
        }
        match name.to_ascii_lowercase().as_str() {
            "curiosity" => Ok(Self::Curiosity),
            "perseverance" => Ok(Self::Perseverance),
            _ => Err(Error::UnknownRover(name.to_string())),
        }
    }
}

/// One photo from the rover listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoverPhoto {
    pub img_src: String,
    pub camera: String,
}

#[derive(Deserialize)]
struct RoverManifest {
    rover: RoverInfo,
}

#[derive(Deserialize)]
struct RoverInfo {
    max_sol: u32,
}

#[derive(Deserialize)]
struct PhotoListing {
    photos: Vec<PhotoEntry>,
}

#[derive(Deserialize)]
struct PhotoEntry {
    img_src: String,
    camera: CameraEntry,
}

#[derive(Deserialize)]
struct CameraEntry {
    name: String,
}

/// Mars rover photos endpoint.
#[derive(Debug, Clone)]
pub struct RoverApi {
    api: NasaApi,
    rover: Rover,
}

impl RoverApi {
    pub fn new(api: NasaApi, rover: Rover) -> Self {
        Self { api, rover }
    }

    pub fn rover(&self) -> Rover {
        self.rover
    }

    pub fn client(&self) -> &reqwest::Client {
        self.api.client()
    }

    pub async fn last_sol(&self) -> Result<u32> {
        let path = format!("/mars-photos/api/v1/rovers/{}", self.rover);
        let manifest: RoverManifest = self.api.get_json(&path, &[]).await?;
        debug!(rover = %self.rover, sol = manifest.rover.max_sol, "latest sol");
        Ok(manifest.rover.max_sol)
    }

    pub async fn list_images(&self, sol: u32, camera: Option<&str>) -> Result<Vec<RoverPhoto>> {
        let path = format!("/mars-photos/api/v1/rovers/{}/photos", self.rover);
        let mut params = vec![("sol", sol.to_string())];
        if let Some(camera) = camera {
            params.push(("camera", camera.to_string()));
        }
        let listing: PhotoListing = self.api.get_json(&path, &params).await?;
        Ok(parse_listing(listing))
    }
}

fn parse_listing(listing: PhotoListing) -> Vec<RoverPhoto> {
    listing
        .photos
        .into_iter()
        .map(|entry| RoverPhoto {
            img_src: entry.img_src,
            camera: entry.camera.name,
        })
        .collect()
}

/// Last path segment of a URL.
pub fn file_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}
