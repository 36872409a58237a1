pub(crate) mod request_id;

use axum::http::StatusCode;

type RejectionType = (StatusCode, String);
