use serde::Serialize;

use crate::api::request::{Operation, PendingRequest};
use crate::api::{ApiClient, ApiError};
use crate::models::{Card, NewCard, Page};

#[derive(Serialize)]
struct CardPatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    card_holder_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_default: Option<bool>,
}

pub struct CardsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> CardsApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Cards of the signed-in user, default card first
    pub async fn list(&self) -> Result<Vec<Card>, ApiError> {
        let page: Page<Card> = self
            .client
            .send_json(PendingRequest::new(Operation::ListCards))
            .await?;
        Ok(page.into_vec())
    }

    pub async fn add(&self, card: &NewCard) -> Result<Card, ApiError> {
        let request = PendingRequest::new(Operation::AddCard).json(card)?;
        self.client.send_json(request).await
    }

    pub async fn get(&self, id: i64) -> Result<Card, ApiError> {
        self.client
            .send_json(PendingRequest::new(Operation::GetCard(id)))
            .await
    }

    pub async fn rename(&self, id: i64, card_holder_name: &str) -> Result<Card, ApiError> {
        let request = PendingRequest::new(Operation::UpdateCard(id)).json(&CardPatch {
            card_holder_name: Some(card_holder_name),
            is_default: None,
        })?;
        self.client.send_json(request).await
    }

    /// Make this the default card. The ledger unsets the previous default.
    pub async fn set_default(&self, id: i64) -> Result<Card, ApiError> {
        let request = PendingRequest::new(Operation::SetDefaultCard(id)).json(&CardPatch {
            card_holder_name: None,
            is_default: Some(true),
        })?;
        self.client.send_json(request).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.client
            .send_empty(PendingRequest::new(Operation::DeleteCard(id)))
            .await
    }
}
