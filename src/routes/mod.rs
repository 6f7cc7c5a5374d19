pub mod identify;
pub mod recommend;
