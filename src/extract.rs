use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::error::AppError;

/// Local version of [`axum::Json`]. A body that fails to parse is answered
/// with the usual `{"error": ...}` 400 instead of axum's plain-text rejection.
#[derive(Debug)]
pub struct Json<T>(pub T);

impl<T> IntoResponse for Json<T>
where
    T: serde::Serialize,
{
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

#[async_trait]
impl<T, S> FromRequest<S> for Json<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(inner) => Ok(Json(inner.0)),
            Err(rejection) => {
                let message = match rejection {
                    JsonRejection::JsonDataError(e) => e.body_text(),
                    JsonRejection::JsonSyntaxError(e) => e.body_text(),
                    JsonRejection::MissingJsonContentType(_) => "Invalid content type".to_string(),
                    JsonRejection::BytesRejection(e) => e.body_text(),
                    other => {
                        warn!("unhandled JsonRejection category: {other:?}");
                        other.body_text()
                    }
                };
                Err(AppError::Validation(message))
            }
        }
    }
}
