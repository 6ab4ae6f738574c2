use serde::Serialize;

use crate::workflow::StageRole;

/// Stages of the repository to store synchronisation, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStage {
    ValidateConfig,
    PrepareWorkspace,
    CloneRepository,
    SelectBranch,
    Backup,
    ProvisionScratchDb,
    InitDatabase,
    UnbindStore,
    LoadSource,
    UpdateDatabase,
    DumpConfig,
    BindStore,
    LoadStoreConfig,
    LockObjects,
    MergeConfig,
    ApplyMergedConfig,
    CommitToStore,
    Finalize,
}

impl SyncStage {
    pub const ALL: [SyncStage; 18] = [
        SyncStage::ValidateConfig,
        SyncStage::PrepareWorkspace,
        SyncStage::CloneRepository,
        SyncStage::SelectBranch,
        SyncStage::Backup,
        SyncStage::ProvisionScratchDb,
        SyncStage::InitDatabase,
        SyncStage::UnbindStore,
        SyncStage::LoadSource,
        SyncStage::UpdateDatabase,
        SyncStage::DumpConfig,
        SyncStage::BindStore,
        SyncStage::LoadStoreConfig,
        SyncStage::LockObjects,
        SyncStage::MergeConfig,
        SyncStage::ApplyMergedConfig,
        SyncStage::CommitToStore,
        SyncStage::Finalize,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SyncStage::ValidateConfig => "validate-config",
            SyncStage::PrepareWorkspace => "prepare-workspace",
            SyncStage::CloneRepository => "clone-repository",
            SyncStage::SelectBranch => "select-branch",
            SyncStage::Backup => "backup",
            SyncStage::ProvisionScratchDb => "provision-scratch-db",
            SyncStage::InitDatabase => "init-database",
            SyncStage::UnbindStore => "unbind-store",
            SyncStage::LoadSource => "load-source",
            SyncStage::UpdateDatabase => "update-database",
            SyncStage::DumpConfig => "dump-config",
            SyncStage::BindStore => "bind-store",
            SyncStage::LoadStoreConfig => "load-store-config",
            SyncStage::LockObjects => "lock-objects",
            SyncStage::MergeConfig => "merge-config",
            SyncStage::ApplyMergedConfig => "apply-merged-config",
            SyncStage::CommitToStore => "commit-to-store",
            SyncStage::Finalize => "finalize",
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            SyncStage::ValidateConfig => "sync.validate_config_failed",
            SyncStage::PrepareWorkspace => "sync.prepare_workspace_failed",
            SyncStage::CloneRepository => "sync.clone_repository_failed",
            SyncStage::SelectBranch => "sync.select_branch_failed",
            SyncStage::Backup => "sync.backup_failed",
            SyncStage::ProvisionScratchDb => "sync.provision_scratch_db_failed",
            SyncStage::InitDatabase => "sync.init_database_failed",
            SyncStage::UnbindStore => "sync.unbind_store_failed",
            SyncStage::LoadSource => "sync.load_source_failed",
            SyncStage::UpdateDatabase => "sync.update_database_failed",
            SyncStage::DumpConfig => "sync.dump_config_failed",
            SyncStage::BindStore => "sync.bind_store_failed",
            SyncStage::LoadStoreConfig => "sync.load_store_config_failed",
            SyncStage::LockObjects => "sync.lock_objects_failed",
            SyncStage::MergeConfig => "sync.merge_config_failed",
            SyncStage::ApplyMergedConfig => "sync.apply_merged_config_failed",
            SyncStage::CommitToStore => "sync.commit_to_store_failed",
            SyncStage::Finalize => "sync.finalize_failed",
        }
    }

    /// Whether the stage changes the target infobase, database or store.
    pub fn mutates(&self) -> bool {
        !matches!(
            self,
            SyncStage::ValidateConfig
                | SyncStage::PrepareWorkspace
                | SyncStage::CloneRepository
                | SyncStage::SelectBranch
                | SyncStage::Backup
                | SyncStage::Finalize
        )
    }

    pub fn role(&self) -> StageRole {
        match self {
            SyncStage::Backup => StageRole::Backup,
            _ => StageRole::Work,
        }
    }

    /// One-line description used in plans.
    pub fn describe(&self) -> &'static str {
        match self {
            SyncStage::ValidateConfig => "Check repository, store, infobase and database settings",
            SyncStage::PrepareWorkspace => "Create a temporary working directory",
            SyncStage::CloneRepository => "Clone the repository into the working directory",
            SyncStage::SelectBranch => "Check out the configured branch",
            SyncStage::Backup => "Back up the target database",
            SyncStage::ProvisionScratchDb => "Create a scratch database (scratch storage mode only)",
            SyncStage::InitDatabase => "Initialise the infobase",
            SyncStage::UnbindStore => "Unbind the infobase from the configuration store",
            SyncStage::LoadSource => "Load configuration sources from the checkout",
            SyncStage::UpdateDatabase => "Apply the loaded configuration to the database",
            SyncStage::DumpConfig => "Dump the configuration to a file for merging",
            SyncStage::BindStore => "Bind the infobase to the configuration store",
            SyncStage::LoadStoreConfig => "Load the store configuration into the infobase",
            SyncStage::LockObjects => "Lock store objects for the commit",
            SyncStage::MergeConfig => "Merge the dumped configuration into the store configuration",
            SyncStage::ApplyMergedConfig => "Apply the merged configuration to the database",
            SyncStage::CommitToStore => "Commit the merged configuration to the store",
            SyncStage::Finalize => "Report the run summary",
        }
    }
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
