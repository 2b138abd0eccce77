pub mod quota;
pub mod run;
pub mod sim;
pub mod validate;
