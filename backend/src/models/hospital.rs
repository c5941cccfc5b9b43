//! Emergency-room facility records.

use serde::{Deserialize, Serialize};

crate::row_id!(HospitalId);

/// A facility known to the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hospital {
    pub id: HospitalId,
    pub name: String,
    pub region: Option<String>,
    /// Ministry installation permit number; the natural key used by ingestion.
    pub permit_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub is_active: bool,
}

/// Facility attributes carried by an ingestion row.
///
/// Coordinates are unknown at ingestion time and default to `0.0` until an
/// external geocoder fills them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHospital {
    pub permit_id: String,
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

impl NewHospital {
    pub fn new(permit_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            permit_id: permit_id.into(),
            name: name.into(),
            region: None,
            latitude: 0.0,
            longitude: 0.0,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub(crate) fn into_hospital(self, id: HospitalId) -> Hospital {
        Hospital {
            id,
            name: self.name,
            region: self.region,
            permit_id: self.permit_id,
            latitude: self.latitude,
            longitude: self.longitude,
            is_active: true,
        }
    }
}
