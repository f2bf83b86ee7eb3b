use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::lifecycle::ElectionLifecycle;
use crate::model::{
    api::{
        election::ElectionSummary,
        ledger::{LedgerDump, LedgerVerification},
    },
    common::election::ElectionState,
};
use crate::tally::TallyResult;

pub fn routes() -> Vec<Route> {
    routes![elections, election, tally, ledger, verify_ledger]
}

#[get("/elections?<status>")]
async fn elections(
    status: Option<ElectionState>,
    lifecycle: &State<ElectionLifecycle>,
) -> Result<Json<Vec<ElectionSummary>>> {
    let elections = lifecycle.list_elections(status).await?;
    Ok(Json(elections.into_iter().map(Into::into).collect()))
}

#[get("/elections/<election_id>")]
async fn election(
    election_id: &str,
    lifecycle: &State<ElectionLifecycle>,
) -> Result<Json<ElectionSummary>> {
    Ok(Json(lifecycle.election(election_id).await?.into()))
}

#[get("/elections/<election_id>/tally")]
async fn tally(election_id: &str, lifecycle: &State<ElectionLifecycle>) -> Result<Json<TallyResult>> {
    Ok(Json(lifecycle.tally_election(election_id).await?))
}

#[get("/elections/<election_id>/ledger")]
async fn ledger(election_id: &str, lifecycle: &State<ElectionLifecycle>) -> Result<Json<LedgerDump>> {
    Ok(Json(lifecycle.view_ledger(election_id).await?))
}

#[get("/elections/<election_id>/verification")]
async fn verify_ledger(
    election_id: &str,
    lifecycle: &State<ElectionLifecycle>,
) -> Result<Json<LedgerVerification>> {
    let verified_blocks = lifecycle.verify_election(election_id).await?;
    Ok(Json(LedgerVerification { verified_blocks }))
}
