use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use super::PageContent;
use crate::browser::TableMatrix;

/// A saved result page, parsed once and read like a live one.
pub struct HtmlSnapshot {
    tables: Vec<TableMatrix>,
    body_text: String,
}

impl HtmlSnapshot {
    pub fn parse(markup: &str) -> Self {
        let document = Html::parse_document(markup);
        let (Ok(table_sel), Ok(row_sel), Ok(cell_sel), Ok(body_sel)) = (
            Selector::parse("table"),
            Selector::parse("tr"),
            Selector::parse("th, td"),
            Selector::parse("body"),
        ) else {
            return Self {
                tables: Vec::new(),
                body_text: String::new(),
            };
        };

        let tables = document
            .select(&table_sel)
            .map(|table| {
                table
                    .select(&row_sel)
                    .map(|row| row.select(&cell_sel).map(element_text).collect())
                    .collect()
            })
            .collect();

        let body_text = document
            .select(&body_sel)
            .next()
            .map(element_text)
            .unwrap_or_default();

        Self { tables, body_text }
    }
}

/// Text nodes joined by single spaces, the way a rendered cell reads.
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl PageContent for HtmlSnapshot {
    async fn tables(&self) -> Vec<TableMatrix> {
        self.tables.clone()
    }

    async fn body_text(&self) -> String {
        self.body_text.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_cells_and_body_text() {
        let snapshot = HtmlSnapshot::parse(
            "<html><body><p>结果</p><table>\
             <tr><th>费用种类</th><th>金额</th></tr>\
             <tr><td> 发明专利第4年年费 </td><td>1200</td></tr>\
             </table></body></html>",
        );
        assert_eq!(snapshot.tables.len(), 1);
        assert_eq!(snapshot.tables[0][1], vec!["发明专利第4年年费", "1200"]);
        assert!(snapshot.body_text.starts_with("结果"));
    }
}
