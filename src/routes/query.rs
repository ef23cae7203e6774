use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct NearQuery {
    pub lng: f64,
    pub lat: f64,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WithinQuery {
    pub lng: f64,
    pub lat: f64,
    /// In metres.
    pub radius: f64,
}
