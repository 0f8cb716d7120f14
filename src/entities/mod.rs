//! SeaORM entities for the order and payment workflow.

pub mod cart_line;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod product_variation;

pub use cart_line::Entity as CartLine;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use payment::Entity as Payment;
pub use product_variation::Entity as ProductVariation;

pub use cart_line::Model as CartLineModel;
pub use order::Model as OrderModel;
pub use order_item::Model as OrderItemModel;
pub use payment::Model as PaymentModel;
pub use product_variation::Model as ProductVariationModel;
