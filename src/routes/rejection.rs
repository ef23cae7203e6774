use serde::Serialize;
use warp::reject;

use crate::errors::BackendError;

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
}

impl Rejection {
    pub fn new(context: Context, error: BackendError) -> Self {
        Rejection { context, error }
    }

    pub fn flatten(&self) -> FlattenedRejection {
        let field = match &self.error {
            BackendError::Validation(e) => e.field(),
            _ => None,
        };

        FlattenedRejection {
            context: self.context.clone(),
            field,
            message: format!("{}", self.error),
        }
    }
}

impl reject::Reject for Rejection {}

#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    #[serde(flatten)]
    pub(crate) context: Context,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) field: Option<&'static str>,
    pub(crate) message: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Context {
    Create,
    Delete { id: String },
    Near { lng: f64, lat: f64 },
    Retrieve { id: String },
    Update { id: String },
    Within { lng: f64, lat: f64, radius: f64 },
}

impl Context {
    pub fn create() -> Context {
        Context::Create
    }

    pub fn delete(id: String) -> Context {
        Context::Delete { id }
    }

    pub fn near(lng: f64, lat: f64) -> Context {
        Context::Near { lng, lat }
    }

    pub fn retrieve(id: String) -> Context {
        Context::Retrieve { id }
    }

    pub fn update(id: String) -> Context {
        Context::Update { id }
    }

    pub fn within(lng: f64, lat: f64, radius: f64) -> Context {
        Context::Within { lng, lat, radius }
    }
}
