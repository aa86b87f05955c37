use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

use gantt_api::share::Caller;

use crate::error::ApiErr;
use crate::storage::Db;

/// The caller of a read, from the `Authorization: Bearer <api_key>` header.
///
/// A missing header is an anonymous caller. A malformed header or an unknown
/// key is rejected with 401.
pub struct ReadCaller(pub Caller);

impl<S> FromRequestParts<S> for ReadCaller
where
    S: Send + Sync,
    Db: FromRef<S>,
{
    type Rejection = ApiErr;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(Self(Caller::Anonymous));
        };
        let api_key = header
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ApiErr::unauthorized("invalid Authorization header"))?;

        let db = Db::from_ref(state);
        match db
            .store()
            .resolve_caller(Some(api_key))
            .map_err(ApiErr::from_db("resolve caller"))?
        {
            Some(caller) => Ok(Self(caller)),
            None => Err(ApiErr::unauthorized("invalid API key")),
        }
    }
}
