pub mod cart_sync;
pub mod checkout;
pub mod order_status;
pub mod verification;

pub use cart_sync::{CartReconciler, SkipReason, SyncOutcome};
pub use checkout::{
    payment_methods, PaymentFlowOutcome, PaymentFlowRequest, PaymentFlowService,
    PaymentMethodKind, PaymentMethodOption,
};
pub use order_status::OrderStatusService;
pub use verification::{PaymentStatusVerifier, SweepReport, VerifyOutcome};
