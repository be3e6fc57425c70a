/// 用户主目录创建
///
/// 目录不存在时创建，权限设为 0700 并把所有者改为用户的 uid/gid。
/// 修改所有者需要 root 权限；失败只影响本次提示，不影响登录结果。

use common::{Error, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::info;

/// 创建结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    Created(PathBuf),
    AlreadyExists(PathBuf),
}

/// 创建主目录（阻塞操作，放到 blocking 线程池执行）
pub async fn provision_home(path: &str, uid: u32, gid: u32) -> Result<Provisioned> {
    let path = PathBuf::from(path);
    tokio::task::spawn_blocking(move || create_home(&path, uid, gid))
        .await
        .map_err(|e| Error::Provisioning(format!("任务执行失败: {}", e)))?
}

fn create_home(path: &Path, uid: u32, gid: u32) -> Result<Provisioned> {
    if path.exists() {
        return Ok(Provisioned::AlreadyExists(path.to_path_buf()));
    }

    fs::create_dir_all(path).map_err(|e| provisioning_error(path, "创建", e))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
        .map_err(|e| provisioning_error(path, "设置权限", e))?;
    std::os::unix::fs::chown(path, Some(uid), Some(gid)).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            Error::Provisioning(format!(
                "没有权限修改 {} 的所有者，服务是否以 root 运行？",
                path.display()
            ))
        } else {
            provisioning_error(path, "修改所有者", e)
        }
    })?;

    info!("✅ 已创建主目录: {} (UID:{}, GID:{})", path.display(), uid, gid);
    Ok(Provisioned::Created(path.to_path_buf()))
}

fn provisioning_error(path: &Path, op: &str, e: std::io::Error) -> Error {
    Error::Provisioning(format!("{} {} 失败: {}", op, path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::MetadataExt;

    #[tokio::test]
    async fn test_creates_private_home_for_current_owner() {
        let dir = tempfile::tempdir().unwrap();
        let meta = fs::metadata(dir.path()).unwrap();
        let home = dir.path().join("home").join("alice");

        // 使用临时目录自身的 uid/gid，不需要 root
        let result = provision_home(home.to_str().unwrap(), meta.uid(), meta.gid())
            .await
            .unwrap();
        assert_eq!(result, Provisioned::Created(home.clone()));

        let created = fs::metadata(&home).unwrap();
        assert!(created.is_dir());
        assert_eq!(created.permissions().mode() & 0o777, 0o700);
        assert_eq!(created.uid(), meta.uid());
    }

    #[tokio::test]
    async fn test_existing_home_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let meta = fs::metadata(dir.path()).unwrap();
        let before = meta.permissions().mode();

        let result = provision_home(dir.path().to_str().unwrap(), 0, 0).await.unwrap();
        assert_eq!(result, Provisioned::AlreadyExists(dir.path().to_path_buf()));
        assert_eq!(fs::metadata(dir.path()).unwrap().permissions().mode(), before);
    }

    #[tokio::test]
    async fn test_failure_is_provisioning_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file").unwrap();

        let err = provision_home(blocker.join("alice").to_str().unwrap(), 1000, 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provisioning(_)));
    }
}
