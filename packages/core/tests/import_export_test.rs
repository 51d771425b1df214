//! Import/Export Tests
//!
//! Round trips mindmaps through JSON and XML files via the session commands
//! and checks malformed documents are rejected without leaving anything
//! behind.

#[cfg(test)]
mod import_export_tests {
    use anyhow::Result;
    use mindnoscape_core::db::{DatabaseService, MindmapStore};
    use mindnoscape_core::models::{Command, CommandOutput, MindmapFilter};
    use mindnoscape_core::{
        DataManager, ErrorKind, SessionError, SessionManager, SessionManagerConfig,
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn create_test_manager() -> Result<(Arc<SessionManager>, TempDir)> {
        let temp_dir = TempDir::new()?;
        let db = DatabaseService::new(temp_dir.path().join("test.db")).await?;
        let data = Arc::new(DataManager::with_database(Arc::new(db)));
        let sessions = SessionManager::new(data, SessionManagerConfig::default());
        Ok((sessions, temp_dir))
    }

    async fn run(
        sessions: &SessionManager,
        session_id: &str,
        line: &str,
    ) -> Result<CommandOutput, SessionError> {
        let command = Command::parse(line).expect("test command lines are not blank");
        sessions.session_run(session_id, command).await
    }

    async fn login(sessions: &SessionManager, user: &str) -> Result<String> {
        let id = sessions.session_add().await;
        run(sessions, &id, &format!("user add {}", user)).await?;
        run(sessions, &id, &format!("user select {}", user)).await?;
        Ok(id)
    }

    /// alice's "ideas" with a small nested tree
    async fn build_tree(sessions: &SessionManager) -> Result<String> {
        let id = login(sessions, "alice").await?;
        run(sessions, &id, "mindmap add ideas").await?;
        run(sessions, &id, "mindmap select ideas").await?;
        run(sessions, &id, "node update 0 ideas theme:spring").await?;
        run(sessions, &id, "node add 0 first priority:1").await?;
        run(sessions, &id, r#"node add 0 second "note:two words""#).await?;
        run(sessions, &id, "node add 1 nested").await?;
        Ok(id)
    }

    async fn view(sessions: &SessionManager, session_id: &str) -> Result<String> {
        Ok(run(sessions, session_id, "mindmap view --id").await?.to_string())
    }

    #[tokio::test]
    async fn test_json_round_trip_into_other_account() -> Result<()> {
        let (sessions, temp_dir) = create_test_manager().await?;
        let alice = build_tree(&sessions).await?;
        let path = temp_dir.path().join("out").join("ideas.json");
        let path = path.display().to_string();

        run(&sessions, &alice, &format!("mindmap export {}", path)).await?;
        let exported = view(&sessions, &alice).await?;

        let bob = login(&sessions, "bob").await?;
        let imported = run(&sessions, &bob, &format!("mindmap import {}", path)).await?;
        match imported {
            CommandOutput::Mindmap(info) => {
                assert_eq!(info.name, "ideas");
                assert_eq!(info.owner, "bob");
                assert_eq!(info.node_count, Some(4));
            }
            other => panic!("unexpected output {:?}", other),
        }

        // Same ids, indices, names and content
        assert_eq!(view(&sessions, &bob).await?, exported);
        Ok(())
    }

    #[tokio::test]
    async fn test_xml_import_replaces_same_name() -> Result<()> {
        let (sessions, temp_dir) = create_test_manager().await?;
        let alice = build_tree(&sessions).await?;
        let path = temp_dir.path().join("ideas.xml").display().to_string();

        run(&sessions, &alice, &format!("mindmap export {}", path)).await?;
        let exported = view(&sessions, &alice).await?;
        run(&sessions, &alice, "node delete 2").await?;

        run(&sessions, &alice, &format!("mindmap import {} xml", path)).await?;
        assert_eq!(view(&sessions, &alice).await?, exported);

        let data = sessions.data().clone();
        let owned = data
            .store()
            .mindmap_get(&MindmapFilter::by_owner("alice"))
            .await?;
        assert_eq!(owned.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_explicit_format_overrides_extension() -> Result<()> {
        let (sessions, temp_dir) = create_test_manager().await?;
        let alice = build_tree(&sessions).await?;
        let path = temp_dir.path().join("ideas.dat").display().to_string();

        run(&sessions, &alice, &format!("mindmap export {} XML", path)).await?;
        let written = tokio::fs::read_to_string(&path).await?;
        assert!(written.starts_with("<mindmap"));

        let err = run(&sessions, &alice, &format!("mindmap export {} yaml", path))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::FormatUnsupported));
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_documents_leave_no_mindmap() -> Result<()> {
        let (sessions, temp_dir) = create_test_manager().await?;
        let alice = login(&sessions, "alice").await?;

        let broken = temp_dir.path().join("broken.json");
        tokio::fs::write(&broken, "{ not json").await?;
        let err = run(&sessions, &alice, &format!("mindmap import {}", broken.display()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ParseError));

        // Node 5 hangs off a parent that does not exist
        let orphan = temp_dir.path().join("orphan.json");
        let document = serde_json::json!({
            "name": "orphan",
            "root": {"id": 0, "parent_id": -1, "name": "orphan", "index": "0", "content": [], "children": []},
            "nodes": [
                {"id": 0, "parent_id": -1, "name": "orphan", "index": "0", "content": []},
                {"id": 5, "parent_id": 4, "name": "lost", "index": "4.1", "content": []}
            ]
        });
        tokio::fs::write(&orphan, serde_json::to_string(&document)?).await?;
        let err = run(&sessions, &alice, &format!("mindmap import {}", orphan.display()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ParseError));

        let listed = run(&sessions, &alice, "mindmap list").await?;
        assert_eq!(listed, CommandOutput::Mindmaps(Vec::new()));
        Ok(())
    }

    #[tokio::test]
    async fn test_export_requires_selection() -> Result<()> {
        let (sessions, temp_dir) = create_test_manager().await?;
        let alice = login(&sessions, "alice").await?;
        let path = temp_dir.path().join("none.json").display().to_string();

        let err = run(&sessions, &alice, &format!("mindmap export {}", path))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NoMindmapSelected));
        Ok(())
    }
}
