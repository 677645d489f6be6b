pub mod cart;
pub mod order;
pub mod payment;

pub use cart::{CartItem, LocalCart};
pub use order::{Order, OrderStatus};
pub use payment::{
    DepositProof, PaymentModality, PaymentProvider, PaymentStatus, PaymentTransaction,
    PendingPayment, PersistPaymentRequest, PersistedPayment, ProviderPayload,
};
