//! [`Order`]: the ephemeral input to the order processor.
//!
//! No wire format is fixed here — callers hand the processor an `Order`
//! value however they constructed it. The one piece of fixed structure is
//! the buy/sell classifier in [`Order::classify`].

/// Opaque bytes that may parse as either a canonical user identifier or a
/// wallet-address string. Resolution is the order processor's job; this
/// type only carries the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpaqueAddress(pub Vec<u8>);

impl OpaqueAddress {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for OpaqueAddress {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for OpaqueAddress {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

/// A single buy or sell request against one chain's virtual pool.
#[derive(Debug, Clone, Default)]
pub struct Order {
    pub amount_for_sale: i64,
    pub requested_amount: i64,
    pub buyer_receive_address: Option<OpaqueAddress>,
    pub sellers_send_address: Option<OpaqueAddress>,
}

/// The result of classifying an [`Order`].
#[derive(Debug, Clone)]
pub enum OrderSide {
    /// `cnpy_in` is the gross CNPY the buyer is offering (`amount_for_sale`).
    Buy {
        cnpy_in: i64,
        receive_address: OpaqueAddress,
    },
    /// `tokens_in` is the token amount being sold (`requested_amount`).
    Sell {
        tokens_in: i64,
        send_address: OpaqueAddress,
    },
}

/// Why an order failed classification. Always a [`ErrorKind::Validation`](crate::ErrorKind::Validation).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassifyError {
    #[error("order has both sides zero or negative")]
    BothSidesZero,
    #[error("buy order is missing a buyer receive address")]
    MissingBuyerAddress,
    #[error("sell order is missing a seller send address")]
    MissingSellerAddress,
}

impl Order {
    /// Classify the order as a buy or sell: an order is a **buy** iff both
    /// `amount_for_sale > 0` and `requested_amount > 0` with
    /// `buyer_receive_address` present; otherwise it is a **sell**
    /// identified by `sellers_send_address` and `requested_amount` (tokens
    /// to sell).
    pub fn classify(&self) -> Result<OrderSide, ClassifyError> {
        if self.amount_for_sale > 0 && self.requested_amount > 0 {
            return match &self.buyer_receive_address {
                Some(addr) => Ok(OrderSide::Buy {
                    cnpy_in: self.amount_for_sale,
                    receive_address: addr.clone(),
                }),
                None => Err(ClassifyError::MissingBuyerAddress),
            };
        }

        if self.requested_amount > 0 {
            return match &self.sellers_send_address {
                Some(addr) => Ok(OrderSide::Sell {
                    tokens_in: self.requested_amount,
                    send_address: addr.clone(),
                }),
                None => Err(ClassifyError::MissingSellerAddress),
            };
        }

        Err(ClassifyError::BothSidesZero)
    }
}
