pub mod customer;
pub mod home;
