pub mod user;
pub mod session;
pub mod organization;
pub mod member;
pub mod invitation;
pub mod project;
pub mod org_api_key;
pub mod project_api_key;
pub mod folder;
pub mod folder_access;
pub mod dashboard;
pub mod thread;
pub mod spreadsheet;
pub mod session_property;
pub mod user_session_property_value;
pub mod rls_policy;
pub mod rls_policy_model;
pub mod rls_policy_session_property;

pub use user::Entity as User;
pub use session::Entity as Session;
pub use organization::Entity as Organization;
pub use member::Entity as Member;
pub use invitation::Entity as Invitation;
pub use project::Entity as Project;
pub use org_api_key::Entity as OrgApiKey;
pub use project_api_key::Entity as ProjectApiKey;
pub use folder::Entity as Folder;
pub use folder_access::Entity as FolderAccess;
pub use dashboard::Entity as Dashboard;
pub use thread::Entity as Thread;
pub use spreadsheet::Entity as Spreadsheet;
pub use session_property::Entity as SessionProperty;
pub use user_session_property_value::Entity as UserSessionPropertyValue;
pub use rls_policy::Entity as RlsPolicy;
pub use rls_policy_model::Entity as RlsPolicyModel;
pub use rls_policy_session_property::Entity as RlsPolicySessionProperty;
