//! Wallet and payment endpoints.
//!
//! Payment processing itself is delegated to the external gateway; these
//! calls only create intents and read the ledger.

use common::Envelope;
use rust_decimal::Decimal;
use serde_json::json;

use crate::client::ApiClient;
use crate::models::{TopUpIntent, TransactionKind, WalletBalance, WalletTransaction};
use crate::query::Query;

/// Filters and pagination for the transaction ledger.
#[derive(Debug, Clone, Default)]
pub struct TransactionListParams {
    pub kind: Option<TransactionKind>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl TransactionListParams {
    fn to_query(&self) -> Query {
        Query::new()
            .set_opt("kind", self.kind)
            .set_opt("page", self.page)
            .set_opt("limit", self.limit)
    }
}

/// Wallet method group.
pub struct WalletApi<'a> {
    client: &'a ApiClient,
}

impl<'a> WalletApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Fetch the authenticated user's balance.
    pub async fn balance(&self) -> Envelope<WalletBalance> {
        self.client.get("/wallet/balance", Query::new()).await
    }

    /// List ledger entries.
    pub async fn transactions(
        &self,
        params: &TransactionListParams,
    ) -> Envelope<Vec<WalletTransaction>> {
        self.client
            .get("/wallet/transactions", params.to_query())
            .await
    }

    /// Create a top-up intent through the payment gateway; the UI redirects
    /// to the returned checkout URL.
    pub async fn top_up(&self, amount: Decimal, method: &str) -> Envelope<TopUpIntent> {
        self.client
            .post(
                "/wallet/top-up",
                json!({ "amount": amount, "method": method }),
            )
            .await
    }

    /// Request a payout of available funds.
    pub async fn withdraw(&self, amount: Decimal) -> Envelope<WalletTransaction> {
        self.client
            .post("/wallet/withdraw", json!({ "amount": amount }))
            .await
    }

    /// Transfer funds to another user.
    pub async fn transfer(
        &self,
        to_user_id: &str,
        amount: Decimal,
        note: Option<&str>,
    ) -> Envelope<WalletTransaction> {
        self.client
            .post(
                "/wallet/transfer",
                json!({ "toUserId": to_user_id, "amount": amount, "note": note }),
            )
            .await
    }
}
