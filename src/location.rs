use crate::clock::Timestamp;
use crate::configuration::LocationConfig;
use crate::error::{GuideError, GuideResult};
use async_trait::async_trait;
use serde::Serialize;
use std::str::FromStr;
use tracing::*;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Kakao local category codes the identity backend accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacilityCategory {
    SubwayStation,
    Hospital,
    School,
    PublicOffice,
    Supermarket,
    ConvenienceStore,
    Restaurant,
    Pharmacy,
}

impl FacilityCategory {
    pub const ALL: [FacilityCategory; 8] = [
        FacilityCategory::SubwayStation,
        FacilityCategory::Hospital,
        FacilityCategory::School,
        FacilityCategory::PublicOffice,
        FacilityCategory::Supermarket,
        FacilityCategory::ConvenienceStore,
        FacilityCategory::Restaurant,
        FacilityCategory::Pharmacy,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            FacilityCategory::SubwayStation => "SW8",
            FacilityCategory::Hospital => "HP8",
            FacilityCategory::School => "SC4",
            FacilityCategory::PublicOffice => "PO3",
            FacilityCategory::Supermarket => "MT1",
            FacilityCategory::ConvenienceStore => "CS2",
            FacilityCategory::Restaurant => "FD6",
            FacilityCategory::Pharmacy => "PM9",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FacilityCategory::SubwayStation => "지하철역",
            FacilityCategory::Hospital => "병원",
            FacilityCategory::School => "학교",
            FacilityCategory::PublicOffice => "공공기관",
            FacilityCategory::Supermarket => "대형마트",
            FacilityCategory::ConvenienceStore => "편의점",
            FacilityCategory::Restaurant => "음식점",
            FacilityCategory::Pharmacy => "약국",
        }
    }
}

impl FromStr for FacilityCategory {
    type Err = GuideError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let code = code.trim().to_ascii_uppercase();
        FacilityCategory::ALL
            .into_iter()
            .find(|category| category.code() == code)
            .ok_or(GuideError::UnsupportedFacility(code))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationQuery {
    Summary,
    Address,
    Landmark,
    Facility(FacilityCategory),
}

impl LocationQuery {
    pub fn endpoint(&self) -> &'static str {
        match self {
            LocationQuery::Summary => "/api/identity/summary",
            LocationQuery::Address => "/api/identity/address",
            LocationQuery::Landmark => "/api/identity/landmark",
            LocationQuery::Facility(_) => "/api/identity/facility",
        }
    }
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self) -> GuideResult<Coordinates>;
}

/// Position taken from configuration
pub struct FixedLocationProvider {
    position: Option<Coordinates>,
}

impl FixedLocationProvider {
    pub fn new(position: Option<Coordinates>) -> Self {
        Self { position }
    }

    pub fn from_config(config: &LocationConfig) -> Self {
        let position = match (config.latitude, config.longitude) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        };
        Self::new(position)
    }
}

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    async fn current_position(&self) -> GuideResult<Coordinates> {
        match self.position {
            Some(position) if position.is_valid() => Ok(position),
            _ => Err(GuideError::LocationUnavailable),
        }
    }
}

/// Reuses the last fix for `cache_ms`
pub struct LocationCache {
    provider: Box<dyn LocationProvider>,
    cache_ms: Timestamp,
    last: Option<(Coordinates, Timestamp)>,
}

impl LocationCache {
    pub fn new(provider: Box<dyn LocationProvider>, cache_ms: Timestamp) -> Self {
        Self {
            provider,
            cache_ms,
            last: None,
        }
    }

    pub fn cached(&self, now: Timestamp) -> Option<Coordinates> {
        self.last
            .filter(|(_, taken_at)| now.saturating_sub(*taken_at) < self.cache_ms)
            .map(|(position, _)| position)
    }

    pub async fn refresh(&mut self, now: Timestamp) -> GuideResult<Coordinates> {
        let position = self.provider.current_position().await?;
        debug!(lat = position.lat, lng = position.lng, "Acquired position");
        self.last = Some((position, now));
        Ok(position)
    }
}
