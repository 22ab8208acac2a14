mod builder;
mod server_thread;

pub use builder::ModelBuilder;
pub use server_thread::ServerThread;
