//! Identifiers shared by the integration tests

#![allow(dead_code)]

pub const SERVICE_1_ID: &str = "6F81-5844-456A";
pub const SERVICE_2_ID: &str = "95FF-2EF5-5EA1";

pub const SKU_1_ID: &str = "0009-6F35-3126";
pub const SKU_2_ID: &str = "000F-E31B-0D32";
pub const SKU_3_ID: &str = "0013-863C-A2FF";
