//! The default analyst roster.
//!
//! Six specialist analysts mirroring the research workflow: sentiment,
//! risk control, institutional behavior, technical structure, capital-flow
//! (chip) distribution, and big-deal activity. Roster order is fixed and
//! deterministic; the orchestrator runs entries strictly in this order.
//! Domain tools are registered per analyst by the caller.

use crate::agent::{prompts, AnalystConfig};

pub fn default_roster() -> Vec<AnalystConfig> {
    vec![
        AnalystConfig::new(
            "sentiment_agent",
            "sentiment",
            prompts::SENTIMENT_SYSTEM_PROMPT,
            vec![
                "新聞輿情概況（最新新聞熱點總結）".to_string(),
                "市場情緒分析（整體情緒傾向、看多看空比例）".to_string(),
                "社交媒體情緒（投資者討論熱度、主要觀點）".to_string(),
                "輿情風險評估（負面新聞影響、市場情緒風險）".to_string(),
                "操作建議（基於輿情的交易建議與注意事項）".to_string(),
            ],
        ),
        AnalystConfig::new(
            "risk_control_agent",
            "risk",
            prompts::RISK_SYSTEM_PROMPT,
            vec![
                "主要風險因素識別".to_string(),
                "估值與波動率評估".to_string(),
                "流動性與基本面風險".to_string(),
                "風險等級判斷".to_string(),
                "風險防範建議".to_string(),
            ],
        ),
        AnalystConfig::new(
            "institutional_investor_agent",
            "institutional_investor",
            prompts::INSTITUTIONAL_SYSTEM_PROMPT,
            vec![
                "機構持倉變化概況".to_string(),
                "調研與配置動向".to_string(),
                "北向資金變化".to_string(),
                "機構態度綜合判斷".to_string(),
                "操作建議".to_string(),
            ],
        ),
        AnalystConfig::new(
            "technical_analysis_agent",
            "technical",
            prompts::TECHNICAL_SYSTEM_PROMPT,
            vec![
                "均線系統與趨勢結構".to_string(),
                "量價關係分析".to_string(),
                "關鍵支撐與阻力位".to_string(),
                "技術指標解讀".to_string(),
                "趨勢判斷與操作參考".to_string(),
            ],
        ),
        AnalystConfig::new(
            "chip_analysis_agent",
            "chip_analysis",
            prompts::CHIP_SYSTEM_PROMPT,
            vec![
                "籌碼分布概況".to_string(),
                "主力持倉變化".to_string(),
                "套牢盤與獲利盤結構".to_string(),
                "籌碼集中度判斷".to_string(),
                "操作建議".to_string(),
            ],
        ),
        AnalystConfig::new(
            "big_deal_analysis_agent",
            "big_deal",
            prompts::BIG_DEAL_SYSTEM_PROMPT,
            vec![
                "大單成交概況".to_string(),
                "大單淨流入分析".to_string(),
                "異動時點解讀".to_string(),
                "主力意圖判斷".to_string(),
                "操作建議".to_string(),
            ],
        ),
    ]
}
