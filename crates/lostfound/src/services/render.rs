//! Markdown rendering of stored records for the browse flow

use std::fmt::Write;

use crate::config::DialogConfig;
use crate::models::{ItemRecord, RecordStatus, ReportKind};

/// Render one record as a WeCom markdown message
pub fn record_markdown(record: &ItemRecord, config: &DialogConfig) -> String {
    let mut md = String::new();
    let heading = match record.kind {
        ReportKind::Lost => "丢失物品记录",
        ReportKind::Found => "捡到物品记录",
        ReportKind::Admin => "记录",
    };
    // Writing to a String cannot fail.
    let _ = writeln!(md, "{} ID:{}", heading, record.id);
    let _ = writeln!(md, "所在城市:{}", record.city);
    let _ = writeln!(md, "物品名称:{}", record.item_name);
    if let Some(img) = &record.img_name {
        let _ = writeln!(md, "[图片链接]({})", config.image_link(img));
    }
    let _ = writeln!(md, "描述:{}", record.description);
    let _ = writeln!(md, ">标签:{}", record.tags.join(","));
    let color = match record.status {
        RecordStatus::Unfinished => "warning",
        RecordStatus::Completed => "info",
    };
    let _ = writeln!(
        md,
        "状态:<font color=\"{}\">{}</font>",
        color,
        record.status.as_str()
    );
    md
}
