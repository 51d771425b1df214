//! End-to-end Session Tests
//!
//! Drives the full pipeline (validation, executor, handlers, managers,
//! libsql store) through `SessionManager::session_run` with literal command
//! lines, the way an adapter would.

#[cfg(test)]
mod session_scenarios_tests {
    use anyhow::Result;
    use mindnoscape_core::db::{DatabaseService, MindmapStore, NodeStore};
    use mindnoscape_core::models::{Command, CommandOutput, MindmapFilter, Node, NodeFilter};
    use mindnoscape_core::{
        DataManager, ErrorKind, SessionError, SessionManager, SessionManagerConfig,
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Helper to create a session manager over a fresh database
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

    /// Snapshot of the nodes of the session's current mindmap, by name
    async fn current_nodes(sessions: &SessionManager, session_id: &str) -> Result<Vec<Node>> {
        let session = sessions.session_get(session_id).await?;
        let shared = session
            .lock()
            .await
            .mindmap()
            .expect("a mindmap should be selected");
        let mindmap = shared.lock().await;
        let mut nodes: Vec<Node> = mindmap.nodes.values().cloned().collect();
        nodes.sort_by_key(|node| node.id);
        Ok(nodes)
    }

    fn by_name<'a>(nodes: &'a [Node], name: &str) -> &'a Node {
        nodes
            .iter()
            .find(|node| node.name == name)
            .unwrap_or_else(|| panic!("node '{}' missing", name))
    }

    async fn view(sessions: &SessionManager, session_id: &str) -> Result<String> {
        Ok(run(sessions, session_id, "mindmap view --id").await?.to_string())
    }

    /// alice logged in with mindmap "ideas" selected
    async fn alice_with_ideas(sessions: &SessionManager) -> Result<String> {
        let id = sessions.session_add().await;
        run(sessions, &id, "user add alice pw").await?;
        run(sessions, &id, "user select alice pw").await?;
        run(sessions, &id, "mindmap add ideas").await?;
        run(sessions, &id, "mindmap select ideas").await?;
        Ok(id)
    }

    #[tokio::test]
    async fn test_fresh_mindmap_has_root_named_after_it() -> Result<()> {
        let (sessions, _temp_dir) = create_test_manager().await?;
        let id = alice_with_ideas(&sessions).await?;

        let nodes = current_nodes(&sessions, &id).await?;
        assert_eq!(nodes.len(), 1);
        let root = &nodes[0];
        assert_eq!(root.id, 0);
        assert_eq!(root.name, "ideas");
        assert_eq!(root.parent_id, -1);
        assert_eq!(root.index, "0");
        Ok(())
    }

    #[tokio::test]
    async fn test_add_assigns_dotted_indices() -> Result<()> {
        let (sessions, _temp_dir) = create_test_manager().await?;
        let id = alice_with_ideas(&sessions).await?;

        run(&sessions, &id, "node add 0 first").await?;
        run(&sessions, &id, "node add 0 second").await?;
        run(&sessions, &id, "node add 1 nested").await?;

        let nodes = current_nodes(&sessions, &id).await?;
        let first = by_name(&nodes, "first");
        let second = by_name(&nodes, "second");
        let nested = by_name(&nodes, "nested");
        assert_eq!(first.index, "1");
        assert_eq!(second.index, "2");
        assert_eq!(nested.index, "1.1");
        assert_eq!(by_name(&nodes, "ideas").children, vec![first.id, second.id]);
        Ok(())
    }

    #[tokio::test]
    async fn test_move_reindexes_subtree() -> Result<()> {
        let (sessions, _temp_dir) = create_test_manager().await?;
        let id = alice_with_ideas(&sessions).await?;
        run(&sessions, &id, "node add 0 first").await?;
        run(&sessions, &id, "node add 0 second").await?;
        run(&sessions, &id, "node add 1 nested").await?;

        run(&sessions, &id, "node move 1.1 2").await?;

        let nodes = current_nodes(&sessions, &id).await?;
        let nested = by_name(&nodes, "nested");
        assert_eq!(nested.index, "2.1");
        assert!(by_name(&nodes, "first").children.is_empty());
        assert_eq!(by_name(&nodes, "second").children, vec![nested.id]);

        // The tree view reads the same indices back
        let view = run(&sessions, &id, "mindmap view").await?;
        assert!(view.to_string().contains("2.1 nested"));
        Ok(())
    }

    #[tokio::test]
    async fn test_numeric_sort_orders_children() -> Result<()> {
        let (sessions, _temp_dir) = create_test_manager().await?;
        let id = alice_with_ideas(&sessions).await?;
        run(&sessions, &id, "node add 0 A priority:10").await?;
        run(&sessions, &id, "node add 0 B priority:2").await?;
        run(&sessions, &id, "node add 0 C priority:5").await?;

        run(&sessions, &id, "node sort 0 priority").await?;

        let nodes = current_nodes(&sessions, &id).await?;
        assert_eq!(by_name(&nodes, "B").index, "1");
        assert_eq!(by_name(&nodes, "C").index, "2");
        assert_eq!(by_name(&nodes, "A").index, "3");

        run(&sessions, &id, "node sort 0 priority --reverse").await?;
        let nodes = current_nodes(&sessions, &id).await?;
        assert_eq!(by_name(&nodes, "A").index, "1");
        assert_eq!(by_name(&nodes, "B").index, "3");
        Ok(())
    }

    #[tokio::test]
    async fn test_permissions_follow_visibility() -> Result<()> {
        let (sessions, _temp_dir) = create_test_manager().await?;
        let alice = alice_with_ideas(&sessions).await?;

        let bob = sessions.session_add().await;
        run(&sessions, &bob, "user add bob").await?;
        run(&sessions, &bob, "user select bob").await?;
        run(&sessions, &bob, "mindmap select ideas").await?;

        let err = run(&sessions, &bob, "node add 0 x").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::PermissionDenied));
        let err = run(&sessions, &bob, "mindmap view").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::PermissionDenied));

        let visibility = run(&sessions, &alice, "mindmap permission ideas public").await?;
        assert_eq!(visibility, CommandOutput::Public(true));

        // Access is re-read on every command; no reselect needed
        let view = run(&sessions, &bob, "mindmap view").await?;
        assert!(view.to_string().starts_with("0 ideas"));
        let err = run(&sessions, &bob, "node add 0 x").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::PermissionDenied));
        Ok(())
    }

    #[tokio::test]
    async fn test_user_delete_cascades_mindmaps() -> Result<()> {
        let (sessions, _temp_dir) = create_test_manager().await?;
        let id = alice_with_ideas(&sessions).await?;
        run(&sessions, &id, "node add 0 first").await?;
        run(&sessions, &id, "mindmap add plans").await?;
        run(&sessions, &id, "mindmap add notes").await?;

        let data = sessions.data().clone();
        let owned = data
            .store()
            .mindmap_get(&MindmapFilter::by_owner("alice"))
            .await?;
        assert_eq!(owned.len(), 3);
        let ids: Vec<i64> = owned.iter().map(|mindmap| mindmap.id).collect();

        run(&sessions, &id, "user delete alice").await?;

        let owned = data
            .store()
            .mindmap_get(&MindmapFilter::by_owner("alice"))
            .await?;
        assert!(owned.is_empty());
        for mindmap_id in ids {
            assert!(!data.store().database().mindmap_tables_exist(mindmap_id).await?);
        }

        // The session was logged out along with the user
        let err = run(&sessions, &id, "mindmap list").await.unwrap_err();
        assert!(matches!(err, SessionError::NoUserSelected));
        Ok(())
    }

    #[tokio::test]
    async fn test_node_errors_carry_kinds() -> Result<()> {
        let (sessions, _temp_dir) = create_test_manager().await?;
        let id = alice_with_ideas(&sessions).await?;
        run(&sessions, &id, "node add 0 first").await?;
        run(&sessions, &id, "node add 1 nested").await?;

        let err = run(&sessions, &id, "node delete 0").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::RootProtected));
        let err = run(&sessions, &id, "node move 1 1.1").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::MoveWouldCreateCycle));
        let err = run(&sessions, &id, "node delete 9").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
        let err = run(&sessions, &id, "node add 0 bad nocolon").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidArgument));
        Ok(())
    }

    #[tokio::test]
    async fn test_root_rename_follows_mindmap() -> Result<()> {
        let (sessions, _temp_dir) = create_test_manager().await?;
        let id = alice_with_ideas(&sessions).await?;

        run(&sessions, &id, "node update 0 thoughts").await?;

        let listed = run(&sessions, &id, "mindmap list").await?;
        match listed {
            CommandOutput::Mindmaps(mindmaps) => {
                assert_eq!(mindmaps.len(), 1);
                assert_eq!(mindmaps[0].name, "thoughts");
            }
            other => panic!("unexpected output {:?}", other),
        }

        run(&sessions, &id, "mindmap update thoughts ideas").await?;
        let nodes = current_nodes(&sessions, &id).await?;
        assert_eq!(nodes[0].name, "ideas");
        Ok(())
    }

    #[tokio::test]
    async fn test_find_matches_names_and_content() -> Result<()> {
        let (sessions, _temp_dir) = create_test_manager().await?;
        let id = alice_with_ideas(&sessions).await?;
        run(&sessions, &id, "node add 0 Garden").await?;
        run(&sessions, &id, "node add 0 chores note:garden hose").await?;
        run(&sessions, &id, "node add 0 unrelated").await?;

        let found = run(&sessions, &id, "node find garden").await?;
        match found {
            CommandOutput::Nodes(nodes) => {
                let names: Vec<&str> = nodes.iter().map(|node| node.name.as_str()).collect();
                assert_eq!(names, vec!["Garden", "chores"]);
            }
            other => panic!("unexpected output {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_validation_rejects_before_execution() -> Result<()> {
        let (sessions, _temp_dir) = create_test_manager().await?;
        let id = sessions.session_add().await;

        let err = run(&sessions, &id, "galaxy add x").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidScope(_)));
        let err = run(&sessions, &id, "node fly 0").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidOperation { .. }));
        let err = run(&sessions, &id, "user add").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidArgument));
        let err = run(&sessions, &id, "node add 0 x --bogus").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidArgument));
        let err = run(&sessions, &id, "node add 0 x").await.unwrap_err();
        assert!(matches!(err, SessionError::NoUserSelected));

        let help = run(&sessions, &id, "help node add").await?;
        assert!(help.to_string().contains("node add"));

        let err = run(&sessions, &id, "exit").await.unwrap_err();
        assert!(err.is_exit());
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_session_is_rejected() -> Result<()> {
        let (sessions, _temp_dir) = create_test_manager().await?;
        let err = run(&sessions, "missing", "help").await.unwrap_err();
        assert!(matches!(err, SessionError::SessionNotFound(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_cleanup_drops_idle_sessions() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let db = DatabaseService::new(temp_dir.path().join("test.db")).await?;
        let data = Arc::new(DataManager::with_database(Arc::new(db)));
        let sessions = SessionManager::new(
            data,
            SessionManagerConfig {
                session_timeout: std::time::Duration::from_millis(20),
                ..Default::default()
            },
        );

        let idle = sessions.session_add().await;
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        let active = sessions.session_add().await;

        assert_eq!(sessions.session_cleanup().await, 1);
        assert!(sessions.session_get(&idle).await.is_err());
        assert!(sessions.session_get(&active).await.is_ok());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_are_serialised() -> Result<()> {
        let (sessions, _temp_dir) = create_test_manager().await?;
        let first = alice_with_ideas(&sessions).await?;
        let second = sessions.session_add().await;
        run(&sessions, &second, "user select alice pw").await?;
        run(&sessions, &second, "mindmap select ideas").await?;

        const COUNT: usize = 24;
        let mut tasks = Vec::with_capacity(COUNT);
        for n in 0..COUNT {
            let sessions = sessions.clone();
            let session_id = if n % 2 == 0 { first.clone() } else { second.clone() };
            tasks.push(tokio::spawn(async move {
                run(&sessions, &session_id, &format!("node add 0 n{}", n)).await
            }));
        }
        for task in tasks {
            let output = task.await??;
            assert!(matches!(output, CommandOutput::Id(_)), "unexpected {:?}", output);
        }

        let data = sessions.data().clone();
        let mindmap_id = data
            .store()
            .mindmap_get(&MindmapFilter::by_owner("alice"))
            .await?[0]
            .id;
        let children = data
            .store()
            .node_get(mindmap_id, &NodeFilter::by_parent(0))
            .await?;
        let mut ranks: Vec<usize> = children
            .iter()
            .filter(|node| node.id != 0)
            .map(|node| node.index.parse::<usize>())
            .collect::<Result<_, _>>()?;
        ranks.sort_unstable();
        assert_eq!(ranks, (1..=COUNT).collect::<Vec<_>>());
        Ok(())
    }

    #[tokio::test]
    async fn test_undo_and_redo_walk_the_history() -> Result<()> {
        let (sessions, _temp_dir) = create_test_manager().await?;
        let id = alice_with_ideas(&sessions).await?;
        run(&sessions, &id, "node add 0 first").await?;
        run(&sessions, &id, "node add 0 second").await?;
        let before_nested = view(&sessions, &id).await?;
        run(&sessions, &id, "node add 1 nested k:v").await?;
        let added = view(&sessions, &id).await?;
        run(&sessions, &id, "node update 1.1 renamed k:w extra:1").await?;
        let updated = view(&sessions, &id).await?;
        run(&sessions, &id, "node move 1.1 2").await?;
        let moved = view(&sessions, &id).await?;
        run(&sessions, &id, "node delete 2").await?;
        let deleted = view(&sessions, &id).await?;
        assert!(!deleted.contains("renamed"));

        for expected in [&moved, &updated, &added, &before_nested] {
            run(&sessions, &id, "node undo").await?;
            assert_eq!(&view(&sessions, &id).await?, expected);
        }
        let nested = by_name(&current_nodes(&sessions, &id).await?, "first").children.len();
        assert_eq!(nested, 0);

        for expected in [&added, &updated, &moved, &deleted] {
            run(&sessions, &id, "node redo").await?;
            assert_eq!(&view(&sessions, &id).await?, expected);
        }
        let err = run(&sessions, &id, "node redo").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidArgument));

        // A new edit after an undo drops what could have been redone
        run(&sessions, &id, "node undo").await?;
        run(&sessions, &id, "node add 0 third").await?;
        let err = run(&sessions, &id, "node redo").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidArgument));

        // Reselecting starts a fresh history
        run(&sessions, &id, "mindmap select ideas").await?;
        let err = run(&sessions, &id, "node undo").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidArgument));
        Ok(())
    }

    #[tokio::test]
    async fn test_undo_root_rename_restores_mindmap_name() -> Result<()> {
        let (sessions, _temp_dir) = create_test_manager().await?;
        let id = alice_with_ideas(&sessions).await?;
        run(&sessions, &id, "mindmap add other").await?;

        let err = run(&sessions, &id, "node update 0 other").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::DuplicateKey));

        run(&sessions, &id, "node update 0 thoughts").await?;
        run(&sessions, &id, "node undo").await?;

        let data = sessions.data().clone();
        let mut names: Vec<String> = data
            .store()
            .mindmap_get(&MindmapFilter::by_owner("alice"))
            .await?
            .into_iter()
            .map(|mindmap| mindmap.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["ideas", "other"]);
        assert_eq!(current_nodes(&sessions, &id).await?[0].name, "ideas");
        Ok(())
    }
}
