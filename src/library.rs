//! Tours bundled with the binary.

use tracing::error;

use crate::types::PredefinedTour;

const BUNDLED_TOURS: &str = include_str!("../data/predefined_tours.json");

pub struct TourLibrary {
    tours: Vec<PredefinedTour>,
}

impl TourLibrary {
    pub fn new(tours: Vec<PredefinedTour>) -> Self {
        Self { tours }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    /// The compiled-in dataset. An unreadable dataset yields an empty library.
    pub fn bundled() -> Self {
        Self::from_json(BUNDLED_TOURS).unwrap_or_else(|e| {
            error!("bundled tour dataset is invalid: {}", e);
            Self::new(Vec::new())
        })
    }

    pub fn len(&self) -> usize {
        self.tours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tours.is_empty()
    }

    /// Every tour whose `url` occurs somewhere in `url`.
    pub fn for_url(&self, url: &str) -> Vec<PredefinedTour> {
        self.tours
            .iter()
            .filter(|t| !t.url.is_empty() && url.contains(&t.url))
            .cloned()
            .collect()
    }
}
