//! Dialog configuration module
//!
//! Every user-facing string and the known-city list live here and are injected into the
//! dispatcher at construction time.

use crate::models::ReportKind;
use serde::{Deserialize, Serialize};

/// Prompt texts shown to the user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Prompts {
    pub welcome: String,
    pub lost_operation: String,
    pub found_operation: String,
    pub admin_notice: String,
    pub session_ended: String,
    pub lost_city: String,
    pub found_city: String,
    pub lost_item: String,
    pub found_item: String,
    pub lost_description: String,
    pub found_description: String,
    pub image: String,
    pub general_invalid: String,
    pub city_invalid: String,
    pub empty_input: String,
    pub image_wrong_stage: String,
    pub unsupported_message: String,
    pub confirm_suffix: String,
    pub city_echo: String,
    pub item_echo: String,
    pub description_echo: String,
    pub image_echo: String,
    pub no_image_echo: String,
    pub tags_preview: String,
    /// Shown in the review summary while an edited field has outdated the tags
    pub tags_pending: String,
    pub review_header: String,
    pub review_choices: String,
    pub edit_menu: String,
    pub committing: String,
    pub committed: String,
    pub commit_failed: String,
    pub browse_menu: String,
    pub browse_querying: String,
    pub browse_empty: String,
    pub browse_choose: String,
    pub browse_no_tags: String,
    pub browse_ask_tags: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            welcome: "欢迎使用失物小助手，请问您遇到了什么问题呢?\n1.我丢失了物品\n2.我捡到了物品\n3.我是管理员\n4.结束会话".to_string(),
            lost_operation: "1.添加丢失物品的记录\n2.查看捡到的物品列表\n3.返回".to_string(),
            found_operation: "1.添加捡到物品的记录\n2.查看失物记录列表\n3.返回".to_string(),
            admin_notice: "管理员功能暂未开放。".to_string(),
            session_ended: "会话已结束,感谢使用失物小助手。".to_string(),
            lost_city: "请问你在哪里(城市)丢失了物品呢?".to_string(),
            found_city: "请问你在哪里(城市)捡到了物品呢?".to_string(),
            lost_item: "你丢失的东西是什么呢?".to_string(),
            found_item: "你捡到的东西是什么呢?".to_string(),
            lost_description: "请对丢失的物品进行详细一些的描述(如颜色、品牌等)。".to_string(),
            found_description: "请对捡到的物品进行详细一些的描述(如颜色、品牌等)。".to_string(),
            image: "请上传一张物品的图片,没有图片则输入任何文字即可。".to_string(),
            general_invalid: "无效输入,请重新选择。".to_string(),
            city_invalid: "无效城市名,请重新输入。".to_string(),
            empty_input: "输入不能为空,请重新输入。".to_string(),
            image_wrong_stage: "当前会话阶段无法处理图片".to_string(),
            unsupported_message: "抱歉,机器人无法处理当前类型消息。".to_string(),
            confirm_suffix: "\n1.yes\n2.no".to_string(),
            city_echo: "您所在的城市是:".to_string(),
            item_echo: "物品名称是:".to_string(),
            description_echo: "物品描述是:".to_string(),
            image_echo: "已收到图片,是否使用这张图片?".to_string(),
            no_image_echo: "不上传图片?".to_string(),
            tags_preview: "解析出来的标签:\n".to_string(),
            tags_pending: "(提交时根据修改后的内容重新解析)".to_string(),
            review_header: "请确认以下信息:".to_string(),
            review_choices: "回复1或yes提交记录;\n回复2至5修改对应内容(2.城市 3.物品名称 4.物品描述 5.图片),回复7放弃并结束会话;\n回复其他内容查看修改菜单。".to_string(),
            edit_menu: "请选择需要修改的内容:\n1.操作\n2.城市\n3.物品名称\n4.物品描述\n5.图片\n6.取消修改\n7.放弃并结束会话".to_string(),
            committing: "正在提交记录,请稍候。".to_string(),
            committed: "记录已保存,编号:".to_string(),
            commit_failed: "抱歉,记录保存失败,请稍后重新提交。".to_string(),
            browse_menu: "1.查看全部记录\n2.查看未完成的记录\n3.查看已完成的记录\n4.按标签查找\n5.返回".to_string(),
            browse_querying: "正在查询,请稍候。".to_string(),
            browse_empty: "暂无符合条件的记录。".to_string(),
            browse_choose: "1.返回查询菜单\n2.结束会话".to_string(),
            browse_no_tags: "暂无可用标签。".to_string(),
            browse_ask_tags: "请输入要查找的标签,多个标签以空格分隔。可用标签:\n".to_string(),
        }
    }
}

impl Prompts {
    pub fn operation(&self, kind: ReportKind) -> &str {
        match kind {
            ReportKind::Found => &self.found_operation,
            _ => &self.lost_operation,
        }
    }

    pub fn city(&self, kind: ReportKind) -> &str {
        match kind {
            ReportKind::Found => &self.found_city,
            _ => &self.lost_city,
        }
    }

    pub fn item(&self, kind: ReportKind) -> &str {
        match kind {
            ReportKind::Found => &self.found_item,
            _ => &self.lost_item,
        }
    }

    pub fn description(&self, kind: ReportKind) -> &str {
        match kind {
            ReportKind::Found => &self.found_description,
            _ => &self.lost_description,
        }
    }

    /// `<label><value>` followed by the yes/no choice
    pub fn confirm(&self, label: &str, value: &str) -> String {
        format!("{}{}{}", label, value, self.confirm_suffix)
    }
}

/// Dialog feature configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogConfig {
    /// Cities accepted at the city stage (exact match)
    #[serde(default = "default_cities")]
    pub cities: Vec<String>,

    /// Base URL the image links in rendered records point at
    #[serde(default)]
    pub image_base_url: String,

    #[serde(default)]
    pub prompts: Prompts,
}

pub fn default_cities() -> Vec<String> {
    ["杭州", "上海", "成都", "广州", "北京"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            cities: default_cities(),
            image_base_url: String::new(),
            prompts: Prompts::default(),
        }
    }
}

impl DialogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cities(mut self, cities: Vec<String>) -> Self {
        self.cities = cities;
        self
    }

    pub fn with_image_base_url(mut self, url: impl Into<String>) -> Self {
        self.image_base_url = url.into();
        self
    }

    pub fn is_known_city(&self, city: &str) -> bool {
        self.cities.iter().any(|c| c == city)
    }

    /// Public link to a stored image
    pub fn image_link(&self, image_name: &str) -> String {
        format!(
            "{}/api/bot/imgs/{}",
            self.image_base_url.trim_end_matches('/'),
            image_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_city_membership_is_exact() {
        let config = DialogConfig::default();
        assert!(config.is_known_city("杭州"));
        assert!(!config.is_known_city("杭州市"));
        assert!(!config.is_known_city(""));
        assert!(!config.is_known_city(" 杭州"));
    }

    #[test]
    fn test_confirm_prompt_format() {
        let prompts = Prompts::default();
        assert_eq!(
            prompts.confirm(&prompts.city_echo, "杭州"),
            "您所在的城市是:杭州\n1.yes\n2.no"
        );
    }

    #[test]
    fn test_image_link_trims_slash() {
        let config = DialogConfig::default().with_image_base_url("https://bot.example.com/");
        assert_eq!(
            config.image_link("a.png"),
            "https://bot.example.com/api/bot/imgs/a.png"
        );
    }
}
