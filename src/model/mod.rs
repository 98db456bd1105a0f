pub mod base;
pub mod counts;
pub mod logspace;
pub mod pcfg;
pub mod restaurant;
pub mod translation;

pub use self::base::{BaseMeasure, FragmentPriorKind, StringPriorKind};
pub use self::counts::{DistributedRuleCounts, RuleCounts, SyncReport};
pub use self::pcfg::PcfgTable;
pub use self::restaurant::RestaurantProcess;
pub use self::translation::TranslationTable;
