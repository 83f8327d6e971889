//! Node key management and address encoding

pub mod wallet;

pub use wallet::{
    convert_address, hash_pub_key, validate_address, Wallet, ADDRESS_CHECK_SUM_LEN, VERSION,
};
