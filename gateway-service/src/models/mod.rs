pub mod gateway_config;
pub mod payment;
pub mod query;
pub mod subscription;

pub use gateway_config::{GatewayConfig, GatewayMode, Provider};
pub use payment::{
    Address, BankAccountDetails, Customer, Payment, PaymentLine, PaymentStatus, PeriodRef, Refund,
};
pub use query::{IdPage, RecordQuery, RecordType};
pub use subscription::{Phase, PhaseInterval, PhaseIntervalUnit, Subscription, SubscriptionStatus};
