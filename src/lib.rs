//! Room assignment for group housing.
//!
//! Members are scored pairwise by [`build_affinity`], placed into rooms by
//! [`Optimizer::solve`] under must-apart, must-together, fixed-room and
//! capacity rules, and then adjusted by hand one move at a time with
//! [`Solution::apply_move`].
//!
//! ```
//! use room_wizard::{ConstraintConfig, Member, Optimizer, RoomTemplate, SolverConfig};
//!
//! let mut ann = Member::new("ann", "Ann");
//! ann.requested_with.push("Bob".to_string());
//! let members = vec![ann, Member::new("bob", "Bob"), Member::new("cy", "Cy")];
//! let config = ConstraintConfig::new(vec![
//!     RoomTemplate::new("r1", "North", 2),
//!     RoomTemplate::new("r2", "South", 1),
//! ]);
//!
//! let outcome = Optimizer::new(SolverConfig::default().with_time_limit_secs(5.0))
//!     .solve(&members, &config);
//! let solution = outcome.solution().unwrap();
//! assert!(solution.room("r1").unwrap().contains("bob"));
//! ```

pub mod action;
pub mod anneal;
pub mod cache;
pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod optimize;
pub mod problem;
pub mod search;
pub mod solution;
pub mod validate;
pub mod weights;

pub use config::{AnnealParams, SolverConfig};
pub use error::{Result, RoomError};
pub use model::condition::{AffinityMatrix, ConstraintConfig, HardConstraints, SoftWeights};
pub use model::entity::{Attributes, Member};
pub use model::group::{Room, RoomTemplate};
pub use optimize::{run_optimization, Optimizer, Outcome};
pub use solution::{ExportRow, MoveRecord, Solution};
pub use validate::{validate_move, MoveOutcome, MoveRequest};
pub use weights::build_affinity;
