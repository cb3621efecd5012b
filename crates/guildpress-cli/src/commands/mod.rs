pub mod db;
pub mod export;
pub mod process;
pub mod scrape;
