pub mod commit;
pub mod integrate;
pub mod mirror;
pub mod show;
pub mod validate;

pub use commit::Commit;
pub use integrate::Integrate;
pub use mirror::Mirror;
pub use show::Show;
pub use validate::Validate;
