pub mod broadcast;
pub mod card_catalog;
pub mod configuration;
pub mod domain;
pub mod email_client;
pub mod nypl_client;
pub mod routes;
pub mod startup;
pub mod telemetry;
pub mod templates;
