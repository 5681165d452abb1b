use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("request body aborted: {0}")]
	BodyAborted(#[from] axum::Error),
}

impl Error {
	pub fn status(&self) -> StatusCode {
		match self {
			Self::BodyAborted(_) => StatusCode::BAD_REQUEST,
		}
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> Response {
		(self.status(), self.to_string()).into_response()
	}
}
