pub mod db_utils;
pub mod policy_cache;
