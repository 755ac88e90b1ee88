pub mod deliveries;
pub mod harvests;
pub mod invoices;
pub mod supplies;
pub mod system;
