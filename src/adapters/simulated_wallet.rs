use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::RpcError;
use crate::ports::{TransferRequest, WalletProvider};

struct WalletState {
    account: String,
    balance_wei: u128,
    authorized: bool,
    connect_error: Option<RpcError>,
    send_error: Option<RpcError>,
    sent: Vec<TransferRequest>,
}

/// Single-account wallet that answers the provider RPC surface locally.
pub struct SimulatedWallet {
    state: Mutex<WalletState>,
}

impl SimulatedWallet {
    pub fn new(account: &str, balance_wei: u128) -> Self {
        Self {
            state: Mutex::new(WalletState {
                account: account.to_string(),
                balance_wei,
                authorized: false,
                connect_error: None,
                send_error: None,
                sent: Vec::new(),
            }),
        }
    }

    /// The next `request_accounts` call fails with `error`.
    pub fn fail_next_connect(&self, error: RpcError) {
        self.state.lock().connect_error = Some(error);
    }

    /// The next `send_transaction` call fails with `error`.
    pub fn fail_next_send(&self, error: RpcError) {
        self.state.lock().send_error = Some(error);
    }

    pub fn balance_wei(&self) -> u128 {
        self.state.lock().balance_wei
    }

    pub fn sent_transfers(&self) -> Vec<TransferRequest> {
        self.state.lock().sent.clone()
    }
}

#[async_trait]
impl WalletProvider for SimulatedWallet {
    async fn request_accounts(&self) -> Result<Vec<String>, RpcError> {
        let mut state = self.state.lock();
        if let Some(err) = state.connect_error.take() {
            return Err(err);
        }
        state.authorized = true;
        Ok(vec![state.account.clone()])
    }

    async fn accounts(&self) -> Result<Vec<String>, RpcError> {
        let state = self.state.lock();
        if state.authorized {
            Ok(vec![state.account.clone()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn get_balance(&self, address: &str) -> Result<u128, RpcError> {
        let state = self.state.lock();
        if address.eq_ignore_ascii_case(&state.account) {
            Ok(state.balance_wei)
        } else {
            Ok(0)
        }
    }

    async fn send_transaction(&self, request: TransferRequest) -> Result<String, RpcError> {
        let mut state = self.state.lock();
        if let Some(err) = state.send_error.take() {
            return Err(err);
        }
        if !state.authorized {
            return Err(RpcError::new(4100, "The requested account has not been authorized"));
        }
        if request.value_wei > state.balance_wei {
            return Err(RpcError::new(-32000, "insufficient funds for gas * price + value"));
        }

        state.balance_wei -= request.value_wei;
        state.sent.push(request);
        Ok(format!(
            "0x{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        ))
    }
}
