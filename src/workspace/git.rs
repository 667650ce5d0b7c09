//! Discrete imperative git operations against the configured repository.
//! Synchronous by design: the pipeline runs one stage at a time on one
//! thread, so there is nothing to overlap these with.

use std::path::Path;

use git2::{
    build::CheckoutBuilder, Cred, FetchOptions, PushOptions, RemoteCallbacks, Repository,
    Signature,
};

use crate::error::{AppError, Result};

/// Validate a branch name to prevent argument injection.
/// Rejects names starting with `-` as defence in depth.
fn validate_branch_name(name: &str) -> Result<()> {
    if name.starts_with('-') {
        return Err(AppError::Git(format!(
            "Invalid branch name (starts with '-'): {name}"
        )));
    }
    Ok(())
}

fn make_callbacks(token: Option<&str>) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    match token {
        Some(token) => {
            callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
                Cred::userpass_plaintext("x-access-token", token)
            });
        }
        None => {
            callbacks.credentials(|_url, username_from_url, _allowed_types| {
                Cred::default().or_else(|_| {
                    Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"))
                })
            });
        }
    }
    callbacks
}

fn make_fetch_options(token: Option<&str>) -> FetchOptions<'_> {
    let mut opts = FetchOptions::new();
    opts.remote_callbacks(make_callbacks(token));
    opts
}

fn make_push_options(token: Option<&str>) -> PushOptions<'_> {
    let mut opts = PushOptions::new();
    opts.remote_callbacks(make_callbacks(token));
    opts
}

fn checkout_local(repo: &Repository, branch_name: &str) -> Result<()> {
    let refname = format!("refs/heads/{branch_name}");
    let obj = repo.revparse_single(&refname)?;
    repo.checkout_tree(&obj, None)?;
    repo.set_head(&refname)?;
    Ok(())
}

/// Switch to the mainline branch and bring it up to date with the remote
/// (fetch + fast-forward). Guarantees fixes are drafted against current
/// mainline before a working branch is cut.
pub fn sync_mainline(dir: &Path, mainline: &str, remote_name: &str, token: Option<&str>) -> Result<()> {
    validate_branch_name(mainline)?;

    let repo = Repository::open(dir)?;
    checkout_local(&repo, mainline)?;

    let mut remote = repo.find_remote(remote_name)?;
    let refspec = format!("+refs/heads/{mainline}:refs/remotes/{remote_name}/{mainline}");
    let mut fetch_opts = make_fetch_options(token);
    remote.fetch(&[&refspec], Some(&mut fetch_opts), None)?;

    let remote_ref = repo.find_reference(&format!("refs/remotes/{remote_name}/{mainline}"))?;
    let target = remote_ref.peel_to_commit()?;
    let annotated = repo.find_annotated_commit(target.id())?;
    let (analysis, _) = repo.merge_analysis(&[&annotated])?;

    if analysis.is_up_to_date() {
        return Ok(());
    }
    if !analysis.is_fast_forward() {
        return Err(AppError::Git(format!(
            "local {mainline} has diverged from {remote_name}/{mainline}; refusing to merge"
        )));
    }

    let refname = format!("refs/heads/{mainline}");
    let mut head_ref = repo.find_reference(&refname)?;
    head_ref.set_target(target.id(), "fast-forward")?;
    repo.set_head(&refname)?;
    repo.checkout_head(Some(CheckoutBuilder::default().force()))?;
    Ok(())
}

/// Create and checkout a new branch at HEAD.
pub fn create_branch(dir: &Path, branch_name: &str) -> Result<()> {
    validate_branch_name(branch_name)?;

    let repo = Repository::open(dir)?;
    let head = repo.head()?;
    let commit = head.peel_to_commit()?;
    repo.branch(branch_name, &commit, false)?;
    checkout_local(&repo, branch_name)
}

/// Stage a single path (relative to the repository root).
pub fn add_path(dir: &Path, rel_path: &Path) -> Result<()> {
    let repo = Repository::open(dir)?;
    let mut index = repo.index()?;
    index.add_path(rel_path)?;
    index.write()?;
    Ok(())
}

/// Commit the index with a message.
pub fn commit(dir: &Path, message: &str, author_name: &str, author_email: &str) -> Result<()> {
    let repo = Repository::open(dir)?;
    let sig = Signature::now(author_name, author_email)?;
    let mut index = repo.index()?;
    let tree_oid = index.write_tree()?;
    let tree = repo.find_tree(tree_oid)?;
    let head = repo.head()?;
    let parent = head.peel_to_commit()?;
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?;
    Ok(())
}

/// Push a branch to the remote.
pub fn push(dir: &Path, branch_name: &str, remote_name: &str, token: Option<&str>) -> Result<()> {
    validate_branch_name(branch_name)?;

    let repo = Repository::open(dir)?;
    let mut remote = repo.find_remote(remote_name)?;
    let refspec = format!("refs/heads/{branch_name}:refs/heads/{branch_name}");
    let mut push_opts = make_push_options(token);
    remote.push(&[&refspec], Some(&mut push_opts))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn init_repo_with_commit(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        fs::write(dir.join("README.md"), "hello").unwrap();
        {
            let mut index = repo.index().unwrap();
            index.add_path(Path::new("README.md")).unwrap();
            index.write().unwrap();
            let tree_oid = index.write_tree().unwrap();
            let tree = repo.find_tree(tree_oid).unwrap();
            let sig = Signature::now("test", "test@example.com").unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[]).unwrap();
        }
        repo
    }

    #[test]
    fn test_validate_branch_name_rejects_dash_prefix() {
        assert!(validate_branch_name("-evil").is_err());
        assert!(validate_branch_name("--upload-pack").is_err());
    }

    #[test]
    fn test_validate_branch_name_accepts_normal() {
        assert!(validate_branch_name("master").is_ok());
        assert!(validate_branch_name("fix-AB-1-20260828120000").is_ok());
    }

    #[test]
    fn test_create_branch_moves_head() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo_with_commit(tmp.path());

        create_branch(tmp.path(), "fix-AB-1-20260828120000").unwrap();

        let repo = Repository::open(tmp.path()).unwrap();
        let head = repo.head().unwrap();
        assert_eq!(head.shorthand(), Some("fix-AB-1-20260828120000"));
    }

    #[test]
    fn test_add_and_commit() {
        let tmp = tempfile::tempdir().unwrap();
        init_repo_with_commit(tmp.path());

        fs::write(tmp.path().join("fixed.txt"), "patched").unwrap();
        add_path(tmp.path(), Path::new("fixed.txt")).unwrap();
        commit(tmp.path(), "fix: resolve finding AB-1", "bot", "bot@example.com").unwrap();

        let repo = Repository::open(tmp.path()).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.message(), Some("fix: resolve finding AB-1"));
    }
}
