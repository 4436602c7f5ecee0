//! Outbound call descriptors.
//!
//! Every backend call is named by an [`Operation`], which maps to a fixed
//! verb, path and target service. A [`PendingRequest`] wraps an operation with
//! its payload so it can be dispatched and, after a token refresh, replayed.

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use super::ApiError;

/// Backend service a request is sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Accounts, cards, transactions and admin panel
    Ledger,
    /// Payment processing
    Payments,
}

/// Resource group an operation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceGroup {
    Auth,
    Cards,
    Transactions,
    Payments,
    Admin,
}

impl ResourceGroup {
    pub fn service(&self) -> Service {
        match self {
            ResourceGroup::Payments => Service::Payments,
            _ => Service::Ledger,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceGroup::Auth => "auth",
            ResourceGroup::Cards => "cards",
            ResourceGroup::Transactions => "transactions",
            ResourceGroup::Payments => "payments",
            ResourceGroup::Admin => "admin",
        }
    }
}

/// Every backend operation the client knows how to call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    // auth
    Login,
    Register,
    RefreshToken,
    Logout,
    Profile,
    ChangePassword,

    // cards
    ListCards,
    AddCard,
    GetCard(i64),
    UpdateCard(i64),
    SetDefaultCard(i64),
    DeleteCard(i64),

    // transactions
    ListTransactions,
    CreateTransaction,
    TransactionDetail(i64),
    UpdateTransactionStatus(String),

    // payments
    ProcessPayment,
    PaymentServiceHealth,

    // admin
    AdminUsers,
    AdminUser(i64),
    AdminUpdateUser(i64),
    AdminDeleteUser(i64),
    AdminCards,
    AdminTransactions,
    AdminDailySummary,
    AdminExportCsv,
    AdminLogs,
}

impl Operation {
    pub fn group(&self) -> ResourceGroup {
        use Operation::*;
        match self {
            Login | Register | RefreshToken | Logout | Profile | ChangePassword => {
                ResourceGroup::Auth
            }
            ListCards | AddCard | GetCard(_) | UpdateCard(_) | SetDefaultCard(_)
            | DeleteCard(_) => ResourceGroup::Cards,
            ListTransactions | CreateTransaction | TransactionDetail(_)
            | UpdateTransactionStatus(_) => ResourceGroup::Transactions,
            ProcessPayment | PaymentServiceHealth => ResourceGroup::Payments,
            AdminUsers | AdminUser(_) | AdminUpdateUser(_) | AdminDeleteUser(_) | AdminCards
            | AdminTransactions | AdminDailySummary | AdminExportCsv | AdminLogs => {
                ResourceGroup::Admin
            }
        }
    }

    pub fn method(&self) -> Method {
        use Operation::*;
        match self {
            Login | Register | RefreshToken | Logout | ChangePassword | AddCard
            | CreateTransaction | ProcessPayment => Method::POST,
            UpdateCard(_) | SetDefaultCard(_) | UpdateTransactionStatus(_)
            | AdminUpdateUser(_) => Method::PATCH,
            DeleteCard(_) | AdminDeleteUser(_) => Method::DELETE,
            Profile | ListCards | GetCard(_) | ListTransactions | TransactionDetail(_)
            | PaymentServiceHealth | AdminUsers | AdminUser(_) | AdminCards
            | AdminTransactions | AdminDailySummary | AdminExportCsv | AdminLogs => Method::GET,
        }
    }

    /// Path relative to the service base address
    pub fn path(&self) -> String {
        use Operation::*;
        match self {
            Login => "/api/auth/login/".into(),
            Register => "/api/auth/register/".into(),
            RefreshToken => "/api/auth/token/refresh/".into(),
            Logout => "/api/auth/logout/".into(),
            Profile => "/api/auth/profile/".into(),
            ChangePassword => "/api/auth/change-password/".into(),

            ListCards | AddCard => "/api/cards/".into(),
            GetCard(id) | UpdateCard(id) | SetDefaultCard(id) | DeleteCard(id) => {
                format!("/api/cards/{}/", id)
            }

            ListTransactions => "/api/transactions/".into(),
            CreateTransaction => "/api/transactions/create/".into(),
            TransactionDetail(id) => format!("/api/transactions/{}/", id),
            UpdateTransactionStatus(reference_id) => {
                format!("/api/transactions/update-status/{}/", reference_id)
            }

            ProcessPayment => "/payments/process".into(),
            PaymentServiceHealth => "/health".into(),

            AdminUsers => "/api/admin-panel/users/".into(),
            AdminUser(id) | AdminUpdateUser(id) | AdminDeleteUser(id) => {
                format!("/api/admin-panel/users/{}/", id)
            }
            AdminCards => "/api/admin-panel/cards/".into(),
            AdminTransactions => "/api/admin-panel/transactions/".into(),
            AdminDailySummary => "/api/admin-panel/summary/daily/".into(),
            AdminExportCsv => "/api/admin-panel/transactions/export/csv/".into(),
            AdminLogs => "/api/admin-panel/logs/".into(),
        }
    }

    /// Login, register and refresh trade secrets for tokens. They are sent
    /// without a bearer header and are never intercepted on 401.
    pub fn is_credential_exchange(&self) -> bool {
        matches!(
            self,
            Operation::Login | Operation::Register | Operation::RefreshToken
        )
    }
}

/// An outbound call that can be dispatched and replayed once.
///
/// The replay is a new value from [`PendingRequest::into_retry`]; the
/// `retried` flag is never flipped in place.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    operation: Operation,
    query: Vec<(String, String)>,
    body: Option<Value>,
    accept: Option<&'static str>,
    retried: bool,
}

impl PendingRequest {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            query: Vec::new(),
            body: None,
            accept: None,
            retried: false,
        }
    }

    /// Attach a JSON body. Serialization happens up front so the request can
    /// be replayed without the original payload.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn accept(mut self, content_type: &'static str) -> Self {
        self.accept = Some(content_type);
        self
    }

    /// Copy of this request marked as the one allowed replay
    pub fn into_retry(self) -> Self {
        Self {
            retried: true,
            ..self
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn accept_header(&self) -> Option<&'static str> {
        self.accept
    }

    pub fn is_retry(&self) -> bool {
        self.retried
    }

    /// Whether a 401 on this request may trigger a refresh + replay
    pub fn may_recover(&self) -> bool {
        !self.retried && !self.operation.is_credential_exchange()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_table() {
        let cases = [
            (Operation::Login, Method::POST, "/api/auth/login/"),
            (Operation::Register, Method::POST, "/api/auth/register/"),
            (Operation::RefreshToken, Method::POST, "/api/auth/token/refresh/"),
            (Operation::Logout, Method::POST, "/api/auth/logout/"),
            (Operation::Profile, Method::GET, "/api/auth/profile/"),
            (Operation::ListCards, Method::GET, "/api/cards/"),
            (Operation::AddCard, Method::POST, "/api/cards/"),
            (Operation::DeleteCard(4), Method::DELETE, "/api/cards/4/"),
            (Operation::SetDefaultCard(4), Method::PATCH, "/api/cards/4/"),
            (Operation::ListTransactions, Method::GET, "/api/transactions/"),
            (Operation::CreateTransaction, Method::POST, "/api/transactions/create/"),
            (Operation::TransactionDetail(9), Method::GET, "/api/transactions/9/"),
            (
                Operation::UpdateTransactionStatus("REF1".into()),
                Method::PATCH,
                "/api/transactions/update-status/REF1/",
            ),
            (Operation::ProcessPayment, Method::POST, "/payments/process"),
            (Operation::AdminUsers, Method::GET, "/api/admin-panel/users/"),
            (Operation::AdminDeleteUser(2), Method::DELETE, "/api/admin-panel/users/2/"),
            (Operation::AdminDailySummary, Method::GET, "/api/admin-panel/summary/daily/"),
            (
                Operation::AdminExportCsv,
                Method::GET,
                "/api/admin-panel/transactions/export/csv/",
            ),
            (Operation::AdminLogs, Method::GET, "/api/admin-panel/logs/"),
        ];

        for (operation, method, path) in cases {
            assert_eq!(operation.method(), method, "{:?}", operation);
            assert_eq!(operation.path(), path, "{:?}", operation);
        }
    }

    #[test]
    fn test_groups_map_to_services() {
        assert_eq!(Operation::ProcessPayment.group().service(), Service::Payments);
        assert_eq!(Operation::PaymentServiceHealth.group(), ResourceGroup::Payments);
        assert_eq!(Operation::Profile.group().service(), Service::Ledger);
        assert_eq!(Operation::AdminLogs.group(), ResourceGroup::Admin);
        assert_eq!(Operation::GetCard(1).group(), ResourceGroup::Cards);
    }

    #[test]
    fn test_credential_exchanges_are_exempt() {
        for op in [Operation::Login, Operation::Register, Operation::RefreshToken] {
            assert!(!PendingRequest::new(op).may_recover());
        }
        assert!(PendingRequest::new(Operation::Logout).may_recover());
    }

    #[test]
    fn test_retry_is_one_shot() {
        let request = PendingRequest::new(Operation::ListTransactions)
            .query(vec![("page".into(), "2".into())]);
        assert!(request.may_recover());

        let replay = request.into_retry();
        assert!(replay.is_retry());
        assert!(!replay.may_recover());
        assert_eq!(replay.query_params(), &[("page".to_string(), "2".to_string())]);
    }
}
