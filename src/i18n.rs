use std::collections::HashMap;

pub struct I18n {
    translations: HashMap<String, HashMap<String, String>>,
    current_lang: String,
}

impl I18n {
    pub fn new(lang: &str) -> Self {
        let mut translations = HashMap::new();

        // English
        let mut en = HashMap::new();
        en.insert("session_started".to_string(), "Recording to {0}. Type '{1}' to stop.".to_string());
        en.insert("session_saved".to_string(), "Session saved: {0} ({1} commands)".to_string());
        en.insert("session_interrupted".to_string(), "Session interrupted, log finalized: {0}".to_string());
        en.insert("session_conflict".to_string(), "A session is already active (pid {0}, log {1}). Run 'scribe stop' first.".to_string());
        en.insert("stop_no_session".to_string(), "No active session".to_string());
        en.insert("stop_signalled".to_string(), "Stopped session (pid {0}), log {1}".to_string());
        en.insert("stop_signal_failed".to_string(), "Could not signal pid {0}: {1}. Session state cleared.".to_string());
        en.insert("no_logs".to_string(), "No session logs found".to_string());
        en.insert("history_title".to_string(), "Session logs:".to_string());
        en.insert("history_line".to_string(), "{0}  {1} commands  {2} bytes".to_string());
        en.insert("log_not_found".to_string(), "No session log for {0}".to_string());
        en.insert("no_inputs".to_string(), "No commands recorded on {0}".to_string());
        en.insert("search_no_match".to_string(), "No matches for '{0}'".to_string());
        en.insert("search_match_count".to_string(), "{0} matching commands".to_string());
        en.insert("exported".to_string(), "Exported {0}".to_string());
        en.insert("export_nothing".to_string(), "Nothing to export".to_string());
        en.insert("replay_title".to_string(), "Replaying {0} commands from {1}".to_string());
        en.insert("replay_complete".to_string(), "Replay complete".to_string());
        en.insert("replay_not_found".to_string(), "Cannot find a session log for {0}".to_string());
        en.insert("summary_written".to_string(), "Summary written to {0}".to_string());
        en.insert("summary_failed".to_string(), "Summary failed: {0}".to_string());
        en.insert("pruned_logs".to_string(), "Removed {0} logs older than {1} days".to_string());
        en.insert("invalid_date".to_string(), "Invalid date '{0}', expected YYYY-MM-DD".to_string());

        // 中文
        let mut zh = HashMap::new();
        zh.insert("session_started".to_string(), "正在记录到 {0}。输入 '{1}' 结束。".to_string());
        zh.insert("session_saved".to_string(), "会话已保存: {0} ({1} 条命令)".to_string());
        zh.insert("session_interrupted".to_string(), "会话被中断，日志已封存: {0}".to_string());
        zh.insert("session_conflict".to_string(), "已有会话正在记录 (pid {0}, 日志 {1})。请先运行 'scribe stop'。".to_string());
        zh.insert("stop_no_session".to_string(), "没有正在记录的会话".to_string());
        zh.insert("stop_signalled".to_string(), "已停止会话 (pid {0})，日志 {1}".to_string());
        zh.insert("stop_signal_failed".to_string(), "无法向进程 {0} 发送信号: {1}。会话状态已清除。".to_string());
        zh.insert("no_logs".to_string(), "没有找到会话日志".to_string());
        zh.insert("history_title".to_string(), "会话日志:".to_string());
        zh.insert("history_line".to_string(), "{0}  {1} 条命令  {2} 字节".to_string());
        zh.insert("log_not_found".to_string(), "{0} 没有会话日志".to_string());
        zh.insert("no_inputs".to_string(), "{0} 没有记录任何命令".to_string());
        zh.insert("search_no_match".to_string(), "没有匹配 '{0}' 的记录".to_string());
        zh.insert("search_match_count".to_string(), "共 {0} 条匹配命令".to_string());
        zh.insert("exported".to_string(), "已导出 {0}".to_string());
        zh.insert("export_nothing".to_string(), "没有可导出的内容".to_string());
        zh.insert("replay_title".to_string(), "回放 {1} 中的 {0} 条命令".to_string());
        zh.insert("replay_complete".to_string(), "回放结束".to_string());
        zh.insert("replay_not_found".to_string(), "找不到 {0} 对应的会话日志".to_string());
        zh.insert("summary_written".to_string(), "摘要已写入 {0}".to_string());
        zh.insert("summary_failed".to_string(), "生成摘要失败: {0}".to_string());
        zh.insert("pruned_logs".to_string(), "已删除 {0} 个超过 {1} 天的日志".to_string());
        zh.insert("invalid_date".to_string(), "无效日期 '{0}'，格式应为 YYYY-MM-DD".to_string());

        translations.insert("en".to_string(), en);
        translations.insert("zh".to_string(), zh);

        // Accept the usual spellings of the language code
        let effective_lang = if lang.starts_with("zh") || lang == "cn" || lang == "chinese" {
            "zh"
        } else {
            "en"
        };

        Self {
            translations,
            current_lang: effective_lang.to_string(),
        }
    }

    pub fn t(&self, key: &str) -> String {
        if let Some(lang_map) = self.translations.get(&self.current_lang) {
            if let Some(value) = lang_map.get(key) {
                return value.clone();
            }
        }
        key.to_string()
    }

    pub fn t_format(&self, key: &str, args: &[&str]) -> String {
        let template = self.t(key);
        let mut result = template;
        for (i, arg) in args.iter().enumerate() {
            result = result.replace(&format!("{{{}}}", i), arg);
        }
        result
    }
}
