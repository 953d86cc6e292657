pub mod attachment_store;
pub mod local_store;
pub mod mutation_queue;
pub mod remote_gateway;

pub use attachment_store::AttachmentStore;
pub use local_store::LocalStore;
pub use mutation_queue::MutationQueue;
pub use remote_gateway::{RemoteAck, RemoteEntity, RemoteGateway, UploadAck};
