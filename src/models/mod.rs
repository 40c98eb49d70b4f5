pub mod booking;
pub mod contact;
pub mod customer;
pub mod payment;
pub mod service;
pub mod slot;

pub use booking::{Booking, BookingStatus};
pub use contact::{ContactForm, ContactMessage};
pub use customer::{ContactDetails, Customer};
pub use payment::{PaymentReference, PaymentStatus};
pub use service::{Service, ServiceInput, ServiceStatus};
pub use slot::{SlotAvailability, SlotGrid};
