pub mod group;
pub mod verdict;

pub use group::{Group, Member, Membership, MembershipRole};
pub use verdict::ValidationVerdict;
