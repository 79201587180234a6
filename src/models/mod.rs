pub mod audit;
pub mod challenge;
pub mod confirmation;
pub mod response;
pub mod verification;

pub use audit::*;
pub use challenge::*;
pub use confirmation::*;
pub use response::*;
pub use verification::*;
