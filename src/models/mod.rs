pub mod customer;
pub mod requests;
pub mod responses;
