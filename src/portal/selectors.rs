//! Locator candidates for the fee-query portal, each list in priority order.

use crate::browser::Locator;

pub const LOGIN_MARKER: &str = "登录";
pub const LOGOUT_MARKER: &str = "退出";
pub const DUE_TAB_TEXT: &str = "应缴费查询";

fn menu(label: &str) -> Vec<Locator> {
    vec![
        Locator::text(label),
        Locator::tag_text("a", label),
        Locator::tag_text("button", label),
    ]
}

/// First-level "缴费服务" entry.
pub fn payment_menu() -> Vec<Locator> {
    let mut candidates = menu("缴费服务");
    candidates.push(Locator::pattern(r"缴费\s*服务"));
    candidates
}

/// Second-level "费用查询" entry.
pub fn fee_query_menu() -> Vec<Locator> {
    menu("费用查询")
}

/// Optional "应缴费查询" sub-tab.
pub fn due_tab() -> Vec<Locator> {
    menu(DUE_TAB_TEXT)
}

pub fn query_inputs() -> Vec<Locator> {
    [
        r#"input[placeholder*="申请号/专利号"]"#,
        r#"input[placeholder*="请输入申请号/专利号"]"#,
        r#"input[placeholder*="申请号"]"#,
        r#"input[aria-label*="申请"]"#,
        r#"input[name*="application" i]"#,
        r#"input[id*="application" i]"#,
        r#"input[type="text"]"#,
    ]
    .into_iter()
    .map(Locator::css)
    .collect()
}

/// Submit control looked up inside the input's own form.
pub fn nearby_query_button() -> Locator {
    Locator::tag_text("button", "查询")
}

/// Page-wide submit controls, used when the form holds none.
pub fn query_buttons() -> Vec<Locator> {
    vec![
        Locator::tag_text("button", "查询"),
        Locator::text("查询"),
        Locator::role("button", "查询|Search"),
    ]
}

/// Notice and consent dialogs that can cover the menu.
pub fn dismiss_controls() -> Vec<Locator> {
    vec![
        Locator::tag_text("button", "我知道了"),
        Locator::tag_text("button", "同意"),
        Locator::tag_text("button", "关闭"),
        Locator::text("我知道了"),
        Locator::text("关 闭"),
    ]
}

pub fn result_marker() -> Locator {
    Locator::css("table, .el-table, .ant-table, #cp_result_table")
}

pub fn no_data_marker() -> Locator {
    Locator::text(crate::extraction::NO_DATA_MARKER)
}

/// Whether the entry page asks for a login instead of showing a signed-in shell.
pub fn shows_login_prompt(body_text: &str) -> bool {
    body_text.contains(LOGIN_MARKER) && !body_text.contains(LOGOUT_MARKER)
}
