//! Stdio Adapter Tests
//!
//! Runs the line adapter against in-memory input and output and checks the
//! connection/session bookkeeping of the adapter manager.

#[cfg(test)]
mod stdio_adapter_tests {
    use anyhow::Result;
    use mindnoscape_core::adapter::{AdapterManager, LineSource, StdioAdapter, TextPresenter};
    use mindnoscape_core::db::DatabaseService;
    use mindnoscape_core::models::Command;
    use mindnoscape_core::{DataManager, SessionError, SessionManager, SessionManagerConfig};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    async fn create_test_adapters() -> Result<(Arc<AdapterManager>, TempDir)> {
        let temp_dir = TempDir::new()?;
        let db = DatabaseService::new(temp_dir.path().join("test.db")).await?;
        let data = Arc::new(DataManager::with_database(Arc::new(db)));
        let sessions = SessionManager::new(data, SessionManagerConfig::default());
        Ok((AdapterManager::new(sessions), temp_dir))
    }

    /// Serve `script` and return every rendered output line
    async fn serve_script(adapters: &AdapterManager, script: &str) -> Result<Vec<String>> {
        let (writer, mut reader) = tokio::io::duplex(64 * 1024);
        let adapter = StdioAdapter::new();
        adapter
            .serve(
                adapters,
                LineSource::new(script.as_bytes()),
                TextPresenter::new(writer),
            )
            .await?;

        let mut output = String::new();
        reader.read_to_string(&mut output).await?;
        Ok(output.lines().map(str::to_string).collect())
    }

    #[tokio::test]
    async fn test_script_stops_at_exit() -> Result<()> {
        let (adapters, _temp_dir) = create_test_adapters().await?;
        let script = "\
user add alice pw
user select alice pw
mindmap add ideas
mindmap select ideas

node add 0 first
node delete 7
exit
node add 0 never
";
        let lines = serve_script(&adapters, script).await?;

        assert_eq!(lines.len(), 7, "unexpected output: {:?}", lines);
        assert!(lines[1].contains("alice"));
        assert!(lines[5].starts_with("error [not found]"));
        assert_eq!(lines[6], "bye");
        assert_eq!(adapters.sessions().session_count().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_end_of_input_closes_connection() -> Result<()> {
        let (adapters, _temp_dir) = create_test_adapters().await?;
        let lines = serve_script(&adapters, "help\nuser add alice\n").await?;

        assert!(lines[0].starts_with("Commands"));
        assert_eq!(adapters.sessions().session_count().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_session_is_replaced() -> Result<()> {
        let (adapters, _temp_dir) = create_test_adapters().await?;
        let help = || Command::new("help", "", Vec::new());

        adapters.command_run("conn", help()).await?;
        let first = adapters.connection_session("conn").await;

        // Expire it behind the adapter's back
        adapters.sessions().session_delete(&first).await?;
        let err = adapters.command_run("conn", help()).await.unwrap_err();
        assert!(matches!(err, SessionError::SessionNotFound(_)));

        adapters.command_run("conn", help()).await?;
        let second = adapters.connection_session("conn").await;
        assert_ne!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn test_connections_get_separate_sessions() -> Result<()> {
        let (adapters, _temp_dir) = create_test_adapters().await?;
        let a = adapters.connection_session("a").await;
        let b = adapters.connection_session("b").await;
        assert_ne!(a, b);
        assert_eq!(adapters.connection_session("a").await, a);

        adapters.shutdown().await;
        assert_eq!(adapters.sessions().session_count().await, 0);
        Ok(())
    }
}
