pub mod manager;
pub mod scheduler;
pub mod skill;
pub mod soft;
pub mod worker;

pub use manager::SkillManager;
pub use scheduler::SchedulerSkill;
pub use skill::Skill;
pub use soft::{load_soft_skills, SoftSkill};
pub use worker::{WorkerDeps, WorkerSkill};
