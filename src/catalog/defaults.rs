//! Built-in agents and workflows

use crate::llm::ollama::DEFAULT_MODEL;
use crate::types::{Agent, AgentSettings, StepConfig, Workflow, CAPABILITY_RAG};
use std::collections::{BTreeSet, HashMap};

pub const LEGAL_RESEARCH: &str = "legal-research";
pub const DOCUMENT_ANALYZER: &str = "document-analyzer";
pub const CASE_STRATEGY: &str = "case-strategy";
pub const PETITION_WRITER: &str = "petition-writer";
pub const FULL_CASE_ANALYSIS: &str = "full-case-analysis";

fn agent(
    slug: &str,
    name: &str,
    description: &str,
    system_prompt: &str,
    capabilities: &[&str],
    tools: &[&str],
    config: AgentSettings,
) -> Agent {
    Agent {
        slug: slug.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        model: DEFAULT_MODEL.to_string(),
        system_prompt: system_prompt.to_string(),
        capabilities: capabilities.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
        tools: tools.iter().map(|t| t.to_string()).collect(),
        config,
        is_active: true,
    }
}

pub fn builtin_agents() -> Vec<Agent> {
    vec![
        agent(
            LEGAL_RESEARCH,
            "Legal Research",
            "Researches legislation and case law for a legal question",
            "Você é um assistente de pesquisa jurídica especializado no direito brasileiro. \
             Responda com base na legislação e na jurisprudência, citando artigos, súmulas \
             e precedentes. Use as ferramentas de busca quando precisar de fontes e deixe \
             claro quando uma informação não foi encontrada.",
            &[CAPABILITY_RAG, "research"],
            &["search_legislation", "search_jurisprudence", "search_knowledge_base"],
            AgentSettings {
                max_tool_iterations: Some(3),
                temperature: Some(0.2),
                ..AgentSettings::default()
            },
        ),
        agent(
            DOCUMENT_ANALYZER,
            "Document Analyzer",
            "Extracts facts, parties, dates and risks from case documents",
            "Você analisa documentos jurídicos. Identifique partes, fatos relevantes, \
             datas, obrigações e riscos. Quando houver um documento anexado, extraia o \
             texto antes de analisar.",
            &["analysis"],
            &["extract_document_text", "get_client_info", "search_knowledge_base"],
            AgentSettings {
                temperature: Some(0.1),
                ..AgentSettings::default()
            },
        ),
        agent(
            CASE_STRATEGY,
            "Case Strategy",
            "Proposes a litigation strategy with deadlines and risks",
            "Você é um estrategista processual. A partir da pesquisa e da análise \
             recebidas, proponha teses, pedidos, riscos e próximos passos. Calcule \
             os prazos processuais relevantes.",
            &["strategy"],
            &["search_jurisprudence", "calculate_deadline", "get_client_info"],
            AgentSettings {
                temperature: Some(0.4),
                ..AgentSettings::default()
            },
        ),
        agent(
            PETITION_WRITER,
            "Petition Writer",
            "Drafts petitions from the facts and the chosen strategy",
            "Você redige peças processuais em português formal. Estruture a petição \
             com endereçamento, qualificação das partes, fatos, fundamentos jurídicos \
             e pedidos.",
            &[CAPABILITY_RAG, "drafting"],
            &["search_legislation", "search_jurisprudence", "calculate_deadline"],
            AgentSettings {
                temperature: Some(0.5),
                turn_timeout_secs: Some(180),
                ..AgentSettings::default()
            },
        ),
    ]
}

pub fn builtin_workflows() -> Vec<Workflow> {
    let mut steps = HashMap::new();
    steps.insert(
        LEGAL_RESEARCH.to_string(),
        StepConfig {
            instructions: Some(
                "Levante a legislação e a jurisprudência aplicáveis ao caso.".to_string(),
            ),
            max_tool_iterations: None,
        },
    );
    steps.insert(
        DOCUMENT_ANALYZER.to_string(),
        StepConfig {
            instructions: Some(
                "Analise os fatos do caso à luz da pesquisa anterior.".to_string(),
            ),
            max_tool_iterations: None,
        },
    );
    steps.insert(
        CASE_STRATEGY.to_string(),
        StepConfig {
            instructions: Some(
                "Proponha a estratégia processual com base na pesquisa e na análise.".to_string(),
            ),
            max_tool_iterations: None,
        },
    );

    vec![Workflow {
        slug: FULL_CASE_ANALYSIS.to_string(),
        name: "Full Case Analysis".to_string(),
        description: "Research, document analysis and strategy in sequence".to_string(),
        agent_sequence: vec![
            LEGAL_RESEARCH.to_string(),
            DOCUMENT_ANALYZER.to_string(),
            CASE_STRATEGY.to_string(),
        ],
        steps,
        is_active: true,
    }]
}
