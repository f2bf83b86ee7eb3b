use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::lifecycle::ElectionLifecycle;
use crate::model::api::election::{CreatedElection, NewElection};

pub fn routes() -> Vec<Route> {
    routes![create_election, activate_election, close_election]
}

#[post("/elections", data = "<new_election>", format = "json")]
async fn create_election(
    new_election: Json<NewElection>,
    lifecycle: &State<ElectionLifecycle>,
) -> Result<Json<CreatedElection>> {
    let election_id = lifecycle.create_election(&new_election.name).await?;
    Ok(Json(CreatedElection { election_id }))
}

#[post("/elections/<election_id>/activate")]
async fn activate_election(election_id: &str, lifecycle: &State<ElectionLifecycle>) -> Result<()> {
    lifecycle.activate_election(election_id).await
}

#[post("/elections/<election_id>/close")]
async fn close_election(election_id: &str, lifecycle: &State<ElectionLifecycle>) -> Result<()> {
    lifecycle.close_election(election_id).await
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::{json, serde_json},
    };

    use crate::model::{common::election::ElectionState, db::election::Election};

    use super::*;

    async fn create(client: &Client, name: &str) -> (Status, Option<CreatedElection>) {
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .body(json!(NewElection { name: name.to_string() }).to_string())
            .dispatch()
            .await;
        let status = response.status();
        let body = response.into_string().await.unwrap_or_default();
        (status, serde_json::from_str(&body).ok())
    }

    async fn post_status(client: &Client, uri: rocket::http::uri::Origin<'_>) -> Status {
        client.post(uri).dispatch().await.status()
    }

    async fn stored(client: &Client, id: &str) -> Election {
        client
            .rocket()
            .state::<ElectionLifecycle>()
            .unwrap()
            .election(id)
            .await
            .unwrap()
    }

    #[backend_test]
    async fn election_lifecycle_over_http(client: Client) {
        let (status, created) = create(&client, "Mayor").await;
        assert_eq!(Status::Ok, status);
        let id = created.unwrap().election_id;
        assert_eq!(stored(&client, &id).await.state, ElectionState::Upcoming);

        assert_eq!(
            Status::Ok,
            post_status(&client, uri!(activate_election(id.as_str()))).await
        );
        let election = stored(&client, &id).await;
        assert_eq!(election.state, ElectionState::Active);
        assert_eq!(election.block_count, 1);

        assert_eq!(
            Status::Ok,
            post_status(&client, uri!(close_election(id.as_str()))).await
        );
        let election = stored(&client, &id).await;
        assert_eq!(election.state, ElectionState::Closed);
        assert_eq!(election.block_count, 2);
    }

    #[backend_test]
    async fn bad_create_election(client: Client) {
        // Empty name.
        assert_eq!(Status::BadRequest, create(&client, "").await.0);

        // Duplicate name.
        assert_eq!(Status::Ok, create(&client, "Mayor").await.0);
        assert_eq!(Status::Conflict, create(&client, "Mayor").await.0);

        // Not JSON.
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .body("Mayor")
            .dispatch()
            .await;
        assert_eq!(Status::UnprocessableEntity, response.status());
    }

    #[backend_test]
    async fn bad_transitions(client: Client) {
        assert_eq!(
            Status::NotFound,
            post_status(&client, uri!(activate_election("missing"))).await
        );

        let id = create(&client, "Mayor").await.1.unwrap().election_id;
        assert_eq!(
            Status::Conflict,
            post_status(&client, uri!(close_election(id.as_str()))).await
        );
        assert_eq!(
            Status::Ok,
            post_status(&client, uri!(activate_election(id.as_str()))).await
        );
        assert_eq!(
            Status::Conflict,
            post_status(&client, uri!(activate_election(id.as_str()))).await
        );
        assert_eq!(
            Status::Ok,
            post_status(&client, uri!(close_election(id.as_str()))).await
        );
        assert_eq!(
            Status::Conflict,
            post_status(&client, uri!(close_election(id.as_str()))).await
        );
    }
}
