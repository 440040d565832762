//! Payment-gateway client — initiates deposit charges and refund
//! payouts.
//!
//! Every call is bounded by the client-wide timeout configured in
//! `main`. Failures come back as explicit [`ApiError::Gateway`] results;
//! nothing here retries automatically — resubmission is the caller's
//! decision, and the gateway confirms charges asynchronously through
//! `POST /payments/callback`.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use contract_ledger::Error as LedgerError;

use crate::errors::{ApiError, Result};

// ─────────────────────────────────────────────────────────
// Gateway response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GatewayAck {
    accepted: bool,
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Ask the gateway to charge the deposit. The verdict arrives later
    /// on the callback endpoint, correlated by `transaction_ref`.
    pub async fn initiate_charge(
        &self,
        transaction_ref: &str,
        contract_id: i64,
        user_id: i64,
        amount: i64,
    ) -> Result<()> {
        let url = format!("{}/charges", self.base_url);
        let ack = self
            .post(&url, json!({
                "transaction_ref": transaction_ref,
                "contract_id": contract_id,
                "user_id": user_id,
                "amount": amount,
            }))
            .await?;
        if !ack.accepted {
            return Err(LedgerError::PaymentFailed(
                ack.message
                    .unwrap_or_else(|| "charge rejected by gateway".to_string()),
            )
            .into());
        }
        debug!("charge {transaction_ref} accepted by gateway");
        Ok(())
    }

    /// Pay the settlement refund back out to the user.
    pub async fn issue_refund(&self, contract_id: i64, user_id: i64, amount: i64) -> Result<()> {
        // Nothing to transfer; skip the round-trip.
        if amount == 0 {
            return Ok(());
        }
        let url = format!("{}/refunds", self.base_url);
        let ack = self
            .post(&url, json!({
                "contract_id": contract_id,
                "user_id": user_id,
                "amount": amount,
            }))
            .await?;
        if !ack.accepted {
            return Err(ApiError::Gateway(format!(
                "refund rejected: {}",
                ack.message.unwrap_or_else(|| "no reason given".to_string())
            )));
        }
        debug!("refund of {amount} for contract {contract_id} accepted by gateway");
        Ok(())
    }

    async fn post(&self, url: &str, body: serde_json::Value) -> Result<GatewayAck> {
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Gateway(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Gateway(format!("gateway returned {status}")));
        }

        response
            .json::<GatewayAck>()
            .await
            .map_err(|e| ApiError::Gateway(format!("bad gateway response: {e}")))
    }
}
