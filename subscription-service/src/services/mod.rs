pub mod email;
pub mod invoice;
pub mod ledger;
pub mod lifecycle;
pub mod memory;
pub mod metrics;
pub mod notifier;
pub mod plans;
pub mod razorpay;
pub mod repository;
pub mod signature;
pub mod subscription;

pub use email::{EmailMessage, EmailProvider, MockEmailProvider, ProviderError, SmtpEmailProvider};
pub use invoice::{HtmlInvoiceRenderer, InvoiceDetails, InvoiceRenderer, RenderedInvoice};
pub use ledger::SubscriptionLedger;
pub use lifecycle::{ActivationOutcome, CreatedOrder, IgnoreReason, LifecycleEngine, OrderOutcome};
pub use memory::InMemorySubscriptionStore;
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{InvoiceNotifier, Notifier};
pub use plans::PlanCatalog;
pub use razorpay::RazorpayClient;
pub use repository::{AppendOutcome, MongoSubscriptionStore, SubscriptionStore};
pub use signature::{PaymentConfirmation, SignatureVerifier, WEBHOOK_SIGNATURE_HEADER};
