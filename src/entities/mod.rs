pub mod product;
pub mod purchase_order_lines;
pub mod purchase_orders;
pub mod reception_lines;
pub mod receptions;

pub use purchase_orders::PurchaseOrderStatus;
pub use reception_lines::QualityStatus;
pub use receptions::ReceptionStatus;
