use data_encoding::BASE64URL_NOPAD;
use log::debug;
use rocket::{serde::json::Json, Route, State};

use crate::error::{Error, Result};
use crate::lifecycle::ElectionLifecycle;
use crate::logging::RequestId;
use crate::model::api::ballot::{BallotReceipt, BallotSubmission};

pub fn routes() -> Vec<Route> {
    routes![submit_ballot]
}

#[post("/elections/<election_id>/ballots", data = "<submission>", format = "json")]
async fn submit_ballot(
    election_id: &str,
    submission: Json<BallotSubmission>,
    lifecycle: &State<ElectionLifecycle>,
    request_id: &RequestId,
) -> Result<Json<BallotReceipt>> {
    let ballot = BASE64URL_NOPAD
        .decode(submission.ballot.as_bytes())
        .map_err(|e| Error::BadRequest(format!("Ballot is not base64url encoded: {e}")))?;
    let block = lifecycle.submit_ballot(election_id, &ballot).await?;
    debug!("{request_id} ballot stored in block {block}");
    Ok(Json(BallotReceipt { block }))
}
