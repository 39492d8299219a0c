//! Typography Language Server Protocol implementation.
//!
//! Keeps the active rule set in memory, publishes a hint for every
//! typography suggestion and offers quick fixes that apply them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use tpg_core::{config::DEFAULT_CONFIG_FILE, load_config, RuleSet, TypographySuggestion, YamlStore};

const SOURCE: &str = "typography";

/// Document state cached by the server.
struct DocumentState {
    content: String,
    version: i32,
}

#[derive(Clone, Default)]
struct RuleFilter {
    only: Vec<String>,
    disable: Vec<String>,
}

impl RuleFilter {
    fn from_settings(map: &serde_json::Map<String, Value>) -> Self {
        Self {
            only: string_list(map.get("onlyRules")),
            disable: string_list(map.get("disabledRules")),
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Typography language server backend.
struct Backend {
    client: Client,
    rules: RwLock<Arc<RuleSet>>,
    documents: DashMap<Url, DocumentState>,
    workspace_root: RwLock<Option<PathBuf>>,
    config_path: RwLock<Option<PathBuf>>,
    rules_path: RwLock<Option<PathBuf>>,
    filter: RwLock<RuleFilter>,
}

impl Backend {
    fn new(client: Client) -> Self {
        Self {
            client,
            rules: RwLock::new(Arc::new(RuleSet::defaults())),
            documents: DashMap::new(),
            workspace_root: RwLock::new(None),
            config_path: RwLock::new(None),
            rules_path: RwLock::new(None),
            filter: RwLock::new(RuleFilter::default()),
        }
    }

    async fn set_config_path(&self, configured: &str) {
        if configured.trim().is_empty() {
            *self.config_path.write().await = None;
            return;
        }
        let configured = PathBuf::from(configured);
        if configured.is_absolute() {
            *self.config_path.write().await = Some(configured);
        } else if let Some(root) = self.workspace_root.read().await.clone() {
            *self.config_path.write().await = Some(root.join(configured));
        }
    }

    async fn reload_rules(&self) -> anyhow::Result<()> {
        let configured = self.config_path.read().await.clone();
        let workspace_root = self.workspace_root.read().await.clone();
        let Some(resolved) = resolve_config_path(configured, workspace_root.as_deref()) else {
            return Ok(());
        };
        let (cfg, config_root) = load_config(&resolved)?;
        let rules_path = cfg.rules_path(&config_root);

        let store = YamlStore::open(&rules_path)
            .with_context(|| format!("Failed to open rule store {}", rules_path.display()));
        let filter = self.filter.read().await.clone();
        let set = match store {
            Ok(store) => RuleSet::load(&store),
            Err(err) => RuleSet::defaults().with_warning(format!("{err:#}")),
        }
        .without(&cfg.disabled_rules)
        .without(&filter.disable)
        .only(&filter.only);

        for warning in set.warnings() {
            self.client
                .log_message(MessageType::WARNING, warning.clone())
                .await;
        }
        self.client
            .log_message(
                MessageType::INFO,
                format!(
                    "Typography rules loaded: {} ({:?}, {} rules)",
                    rules_path.display(),
                    set.origin(),
                    set.rules().len()
                ),
            )
            .await;

        *self.rules.write().await = Arc::new(set);
        *self.config_path.write().await = Some(resolved);
        *self.rules_path.write().await = Some(rules_path);
        Ok(())
    }

    async fn reload_and_republish(&self) {
        if let Err(err) = self.reload_rules().await {
            self.client
                .log_message(
                    MessageType::ERROR,
                    format!("Failed to reload typography rules: {err:#}"),
                )
                .await;
        }
        let uris: Vec<Url> = self.documents.iter().map(|e| e.key().clone()).collect();
        for uri in uris {
            self.publish_diagnostics(uri).await;
        }
    }

    /// Suggestions for a cached document, with its content.
    async fn suggestions_for(&self, uri: &Url) -> Option<(String, Vec<TypographySuggestion>)> {
        let content = self.documents.get(uri)?.content.clone();
        let rules = self.rules.read().await.clone();
        let suggestions = rules.scan(&content);
        Some((content, suggestions))
    }

    /// Publish diagnostics to the client.
    async fn publish_diagnostics(&self, uri: Url) {
        let diagnostics = match self.suggestions_for(&uri).await {
            Some((content, suggestions)) => suggestions
                .iter()
                .map(|s| to_lsp_diagnostic(s, &content))
                .collect(),
            None => vec![],
        };
        let version = self.documents.get(&uri).map(|d| d.version);
        self.client
            .publish_diagnostics(uri, diagnostics, version)
            .await;
    }

    async fn is_watched(&self, path: &Path) -> bool {
        let config_path = self.config_path.read().await.clone();
        let rules_path = self.rules_path.read().await.clone();
        config_path.as_deref() == Some(path) || rules_path.as_deref() == Some(path)
    }
}

/// An explicit config path wins; otherwise the default file in the workspace
/// root. Without either there is nothing to load.
fn resolve_config_path(configured: Option<PathBuf>, root: Option<&Path>) -> Option<PathBuf> {
    configured.or_else(|| root.map(|root| root.join(DEFAULT_CONFIG_FILE)))
}

fn byte_to_position(text: &str, byte_offset: usize) -> Position {
    let byte_offset = byte_offset.min(text.len());
    let mut line: u32 = 0;
    let mut last_newline = 0usize;
    for (idx, ch) in text.char_indices() {
        if idx >= byte_offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            last_newline = idx + 1;
        }
    }
    let character = text
        .get(last_newline..byte_offset)
        .map_or(0, |s| s.encode_utf16().count()) as u32;
    Position { line, character }
}

fn suggestion_range(s: &TypographySuggestion, text: &str) -> Range {
    Range {
        start: byte_to_position(text, s.start),
        end: byte_to_position(text, s.end),
    }
}

fn to_lsp_diagnostic(s: &TypographySuggestion, text: &str) -> Diagnostic {
    Diagnostic {
        range: suggestion_range(s, text),
        severity: Some(DiagnosticSeverity::HINT),
        code: Some(NumberOrString::String(s.rule_id.clone())),
        code_description: None,
        source: Some(SOURCE.to_string()),
        message: format!("{}: {} → {}", s.description, s.original, s.replacement),
        related_information: None,
        tags: None,
        data: None,
    }
}

fn to_text_edit(s: &TypographySuggestion, text: &str) -> TextEdit {
    TextEdit {
        range: suggestion_range(s, text),
        new_text: s.replacement.clone(),
    }
}

fn ranges_touch(a: &Range, b: &Range) -> bool {
    a.start <= b.end && b.start <= a.end
}

fn workspace_edit(uri: &Url, edits: Vec<TextEdit>) -> WorkspaceEdit {
    let mut changes = HashMap::new();
    changes.insert(uri.clone(), edits);
    WorkspaceEdit {
        changes: Some(changes),
        ..Default::default()
    }
}

/// One quick fix per suggestion touching `range`, then a fix-all action
/// when the document has more than one suggestion.
fn code_actions(
    uri: &Url,
    text: &str,
    suggestions: &[TypographySuggestion],
    range: &Range,
) -> Vec<CodeActionOrCommand> {
    let mut actions = Vec::new();
    for s in suggestions {
        let diagnostic = to_lsp_diagnostic(s, text);
        if !ranges_touch(&diagnostic.range, range) {
            continue;
        }
        actions.push(CodeActionOrCommand::CodeAction(CodeAction {
            title: format!("Replace “{}” with “{}”", s.original, s.replacement),
            kind: Some(CodeActionKind::QUICKFIX),
            edit: Some(workspace_edit(uri, vec![to_text_edit(s, text)])),
            diagnostics: Some(vec![diagnostic]),
            command: None,
            is_preferred: Some(true),
            disabled: None,
            data: None,
        }));
    }

    if !actions.is_empty() && suggestions.len() > 1 {
        let edits = suggestions.iter().map(|s| to_text_edit(s, text)).collect();
        actions.push(CodeActionOrCommand::CodeAction(CodeAction {
            title: format!("Fix all typography ({} suggestions)", suggestions.len()),
            kind: Some(CodeActionKind::SOURCE_FIX_ALL),
            edit: Some(workspace_edit(uri, edits)),
            diagnostics: None,
            command: None,
            is_preferred: Some(false),
            disabled: None,
            data: None,
        }));
    }
    actions
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        if let Some(root_uri) = params.root_uri.or_else(|| {
            params
                .workspace_folders
                .as_ref()
                .and_then(|folders| folders.first().map(|f| f.uri.clone()))
        }) {
            if let Ok(path) = root_uri.to_file_path() {
                *self.workspace_root.write().await = Some(path);
            }
        }

        if let Some(Value::Object(map)) = params.initialization_options {
            if let Some(Value::String(config_path)) = map.get("configPath") {
                self.set_config_path(config_path).await;
            }
            *self.filter.write().await = RuleFilter::from_settings(&map);
        }

        if let Err(err) = self.reload_rules().await {
            self.client
                .log_message(
                    MessageType::ERROR,
                    format!("Failed to load typography rules: {err:#}"),
                )
                .await;
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                code_action_provider: Some(CodeActionProviderCapability::Options(
                    CodeActionOptions {
                        code_action_kinds: Some(vec![
                            CodeActionKind::QUICKFIX,
                            CodeActionKind::SOURCE_FIX_ALL,
                        ]),
                        work_done_progress_options: WorkDoneProgressOptions {
                            work_done_progress: None,
                        },
                        resolve_provider: Some(false),
                    },
                )),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "Typography Language Server".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "Typography LSP initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        let content = params.text_document.text;
        let version = params.text_document.version;

        self.documents
            .insert(uri.clone(), DocumentState { content, version });

        self.publish_diagnostics(uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;

        // FULL sync: the last change carries the whole document.
        if let Some(change) = params.content_changes.into_iter().last() {
            self.documents.insert(
                uri.clone(),
                DocumentState {
                    content: change.text,
                    version,
                },
            );
        }

        self.publish_diagnostics(uri).await;
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        let watched = match uri.to_file_path() {
            Ok(path) => self.is_watched(&path).await,
            Err(_) => false,
        };

        if watched {
            self.reload_and_republish().await;
        } else {
            self.publish_diagnostics(uri).await;
        }
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        if let Value::Object(map) = params.settings {
            if let Some(Value::String(config_path)) = map.get("configPath") {
                self.set_config_path(config_path).await;
            }
            *self.filter.write().await = RuleFilter::from_settings(&map);
        }
        self.reload_and_republish().await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let mut should_reload = false;
        for change in &params.changes {
            if let Ok(path) = change.uri.to_file_path() {
                if self.is_watched(&path).await {
                    should_reload = true;
                    break;
                }
            }
        }
        if should_reload {
            self.reload_and_republish().await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.documents.remove(&params.text_document.uri);
        self.client
            .publish_diagnostics(params.text_document.uri, vec![], None)
            .await;
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let uri = &params.text_document.uri;
        let Some((content, suggestions)) = self.suggestions_for(uri).await else {
            return Ok(None);
        };

        let actions = code_actions(uri, &content, &suggestions, &params.range);
        if actions.is_empty() {
            Ok(None)
        } else {
            Ok(Some(actions))
        }
    }
}

#[tokio::main]
async fn main() {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpg_core::scan_with_defaults;

    fn uri() -> Url {
        Url::parse("file:///tmp/notes.md").unwrap()
    }

    #[test]
    fn explicit_config_path_needs_no_workspace_root() {
        let explicit = PathBuf::from("/etc/typography.yml");
        assert_eq!(
            resolve_config_path(Some(explicit.clone()), None),
            Some(explicit)
        );
        assert_eq!(
            resolve_config_path(None, Some(Path::new("/work"))),
            Some(Path::new("/work").join(DEFAULT_CONFIG_FILE))
        );
        assert_eq!(resolve_config_path(None, None), None);
    }

    #[test]
    fn positions_count_utf16_units() {
        let text = "a😀\n“x” --";
        let dash = text.find("--").unwrap();
        assert_eq!(byte_to_position(text, dash), Position { line: 1, character: 4 });
        assert_eq!(byte_to_position(text, 5), Position { line: 0, character: 3 });
    }

    #[test]
    fn diagnostics_are_hints_coded_by_rule() {
        let text = "wait...";
        let found = scan_with_defaults(text);
        let diag = to_lsp_diagnostic(&found[0], text);
        assert_eq!(diag.severity, Some(DiagnosticSeverity::HINT));
        assert_eq!(diag.source.as_deref(), Some(SOURCE));
        assert_eq!(diag.code, Some(NumberOrString::String("ellipsis".into())));
        assert_eq!(diag.range.start, Position { line: 0, character: 4 });
        assert_eq!(diag.range.end, Position { line: 0, character: 7 });
    }

    #[test]
    fn quick_fixes_follow_the_requested_range() {
        let text = "one -- two\nthree...";
        let found = scan_with_defaults(text);
        let cursor = Range {
            start: Position { line: 1, character: 6 },
            end: Position { line: 1, character: 6 },
        };
        let actions = code_actions(&uri(), text, &found, &cursor);
        assert_eq!(actions.len(), 2);
        let CodeActionOrCommand::CodeAction(first) = &actions[0] else {
            panic!("expected code action");
        };
        assert_eq!(first.kind, Some(CodeActionKind::QUICKFIX));
        let edits = &first.edit.as_ref().unwrap().changes.as_ref().unwrap()[&uri()];
        assert_eq!(edits[0].new_text, "…");

        let CodeActionOrCommand::CodeAction(all) = &actions[1] else {
            panic!("expected code action");
        };
        assert_eq!(all.kind, Some(CodeActionKind::SOURCE_FIX_ALL));
        let edits = &all.edit.as_ref().unwrap().changes.as_ref().unwrap()[&uri()];
        assert_eq!(edits.len(), 2);
    }

    #[test]
    fn no_actions_away_from_suggestions() {
        let text = "plain -- text";
        let found = scan_with_defaults(text);
        let elsewhere = Range {
            start: Position { line: 0, character: 0 },
            end: Position { line: 0, character: 2 },
        };
        assert!(code_actions(&uri(), text, &found, &elsewhere).is_empty());
    }
}
