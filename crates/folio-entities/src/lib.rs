pub mod ip_metadata;
pub mod request_logs;

pub mod prelude {
    pub use super::ip_metadata::Entity as IpMetadata;
    pub use super::request_logs::Entity as RequestLogs;
}
