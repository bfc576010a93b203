pub mod create_purchase_order_command;
pub mod delete_purchase_order_command;
pub mod receive_purchase_order_command;
pub mod submit_purchase_order_command;

pub use create_purchase_order_command::{CreatePurchaseOrderCommand, PurchaseOrderItemRequest};
pub use delete_purchase_order_command::{DeletePurchaseOrderCommand, DeletePurchaseOrderResult};
pub use receive_purchase_order_command::{ReceivePurchaseOrderCommand, ReceivePurchaseOrderResult};
pub use submit_purchase_order_command::{SubmitPurchaseOrderCommand, SubmitPurchaseOrderResult};

/// Registers every purchase-order counter with `registry`.
pub fn register_metrics(registry: &prometheus::Registry) -> prometheus::Result<()> {
    create_purchase_order_command::register_metrics(registry)?;
    submit_purchase_order_command::register_metrics(registry)?;
    delete_purchase_order_command::register_metrics(registry)?;
    receive_purchase_order_command::register_metrics(registry)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_register_once_per_registry() {
        let registry = prometheus::Registry::new();
        register_metrics(&registry).unwrap();

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"purchase_order_receptions_total".to_string()));
        assert!(names.contains(&"purchase_order_submissions_total".to_string()));

        assert!(register_metrics(&registry).is_err());
    }
}
