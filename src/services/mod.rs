pub mod feed;
pub mod firestore;
pub mod init;
pub mod notifications;
pub mod push;
pub mod reconcile;
pub mod subscriber;
