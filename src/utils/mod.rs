pub mod jws;
