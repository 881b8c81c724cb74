pub mod thesis;
