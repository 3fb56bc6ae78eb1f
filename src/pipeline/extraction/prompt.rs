//! Prompt builder for the two extraction passes.
//!
//! Templates are versioned and chosen when the builder is constructed. Every
//! vocabulary listing (habitats, archaeology flags, activities, keyword
//! categories) is rendered from the injected `Vocabulary`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::vocabulary::Vocabulary;

/// Prompt template generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptVersion {
    /// First-generation templates: accented Portuguese, range-style hints.
    Legacy,
    /// v1.3 templates: explicit minimum keyword count, JSON-only endings.
    #[default]
    V13,
}

impl PromptVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::V13 => "v13",
        }
    }
}

impl fmt::Display for PromptVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PromptVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "legacy" | "v1" => Ok(Self::Legacy),
            "v13" | "v1.3" | "latest" => Ok(Self::V13),
            other => Err(format!("unknown prompt version: {other}")),
        }
    }
}

/// Renders pass 1 and pass 2 prompts.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    version: PromptVersion,
    vocabulary: Vocabulary,
    min_keywords: usize,
    max_keywords: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(PromptVersion::default(), Vocabulary::default())
    }
}

impl PromptBuilder {
    pub fn new(version: PromptVersion, vocabulary: Vocabulary) -> Self {
        Self {
            version,
            vocabulary,
            min_keywords: 30,
            max_keywords: 80,
        }
    }

    /// Keyword bounds requested from the model. `max` is raised to `min` if lower.
    pub fn with_keyword_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_keywords = min;
        self.max_keywords = max.max(min);
        self
    }

    pub fn version(&self) -> PromptVersion {
        self.version
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Pass 1 prompt, sent together with the image.
    pub fn raw_extraction_prompt(&self) -> String {
        let habitats = self
            .vocabulary
            .habitats
            .iter()
            .map(|h| format!("- {}", h.render()))
            .collect::<Vec<_>>()
            .join("\n");
        let flags = self.vocabulary.archaeology_flags.join(", ");
        let activities = self.vocabulary.activities.join(", ");

        match self.version {
            PromptVersion::V13 => self.raw_v13(&habitats, &flags, &activities),
            PromptVersion::Legacy => self.raw_legacy(&habitats, &flags, &activities),
        }
    }

    /// Pass 2 prompt, text only, embedding the recovered raw result.
    pub fn normalization_prompt(&self, raw: &Value) -> String {
        let raw_data = format!("{raw:#}");
        let categories = self.vocabulary.keyword_categories.join(", ");

        match self.version {
            PromptVersion::V13 => self.normalization_v13(&raw_data, &categories),
            PromptVersion::Legacy => self.normalization_legacy(&raw_data, &categories),
        }
    }

    // ──────────────────────────────────────────────
    // v1.3
    // ──────────────────────────────────────────────

    fn raw_v13(&self, habitats: &str, flags: &str, activities: &str) -> String {
        let min = self.min_keywords;
        format!(
            r#"Voce e um ecologo marinho especializado em ecossistemas costeiros brasileiros.

Analise esta imagem CIENTIFICAMENTE e retorne JSON VALIDO.

HABITATS VALIDOS (tag e pistas visuais):
{habitats}

SINAIS ARQUEOLOGICOS VALIDOS: {flags}

ATIVIDADES VALIDAS: {activities}

Instrucoes CRITICAS:
1. Identifique elementos VISIVEIS (nao invente)
2. Para especies: seja CONSERVADOR - se nao tiver certeza, use nivel taxonomico superior
3. Keywords: MINIMO {min} palavras (cores, elementos, texturas, condicoes)

RETORNE APENAS JSON:
{{
  "scene_summary": "Descricao objetiva em 2-3 frases",
  "habitat_guess": "O MAIS ESPECIFICO dos habitats",
  "habitat_confidence": 0.85,
  "habitat_evidence": "Elementos VISIVEIS que justificam",
  "species_candidates": [
    {{
      "name_pt": "Nome popular EM PORTUGUES",
      "name_scientific": "Genus species OU ordem Ordem",
      "confidence": 0.75,
      "evidence": "Caracteristicas morfologicas VISIVEIS",
      "taxonomy_level": "species|genus|family|order|class"
    }}
  ],
  "archaeology_flags": [],
  "archaeology_evidence": "",
  "archaeology_confidence": 0.0,
  "activities": [],
  "technical_quality": "sharp|slightly_blurred|blurred|underexposed|overexposed|good_exposure",
  "location_guess": null,
  "keywords_raw": [
    "MINIMO {min} keywords:",
    "cores: azul_claro, verde_escuro",
    "elementos: agua, vegetacao, areia",
    "clima: ceu_claro, mare_baixa",
    "tecnica: aerea, panoramica, HDR"
  ]
}}

IMPORTANTE:
- Se nao identificar especie com confianca >50 porcento NAO invente
- Se ve manguezal NAO classifique como praia
- Sinais arqueologicos APENAS com evidencia forte (acumulo de conchas, elevacao, estratificacao)
- location_guess: objeto {{"description", "confidence", "evidence"}} somente se houver marco reconhecivel
- Use MINIMO {min} keywords descritivas

APENAS O JSON:"#
        )
    }

    fn normalization_v13(&self, raw_data: &str, categories: &str) -> String {
        let (min, max) = (self.min_keywords, self.max_keywords);
        format!(
            r#"Voce e um especialista em catalogacao cientifica.

Refine estes metadados:

DADOS BRUTOS:
{raw_data}

TAREFAS:
1. Titulo conciso (5-8 palavras)
2. Descricao curta (1 frase, 20-30 palavras)
3. Descricao longa (2-4 frases, 60-100 palavras)
4. Normalizar keywords para {min}-{max} termos hierarquicos

CATEGORIAS: {categories}

RETORNE APENAS JSON:
{{
  "title": "Titulo de 5-8 palavras",
  "description_short": "1 frase impactante",
  "description_long": "2-4 frases detalhadas com contexto ecologico",
  "keywords_normalized": [
    "{min}-{max} keywords no formato categoria:valor",
    "Exemplo: bioma:manguezal",
    "Exemplo: fauna:rhizophora_mangle",
    "Inclua TODAS categorias relevantes",
    "Balance categorias",
    "Remova duplicatas"
  ]
}}

APENAS JSON:"#
        )
    }

    // ──────────────────────────────────────────────
    // Legacy
    // ──────────────────────────────────────────────

    fn raw_legacy(&self, habitats: &str, flags: &str, activities: &str) -> String {
        let (min, max) = (self.min_keywords, self.max_keywords);
        format!(
            r#"Você é um especialista em ecologia costeira e marinha brasileira, com conhecimento em:
- Ecossistemas costeiros (manguezais, restingas, costões rochosos)
- Fauna e flora regional
- Arqueologia costeira (sambaquis, sítios pré-coloniais)
- Geomorfologia costeira

Analise esta imagem com RIGOR CIENTÍFICO e retorne APENAS um JSON válido.

HABITATS VÁLIDOS:
{habitats}

ESTRUTURA OBRIGATÓRIA:
{{
  "scene_summary": "Descrição factual e objetiva em 2-3 frases.",
  "habitat_guess": "Escolha UM habitat da lista acima.",
  "habitat_confidence": 0.0,
  "habitat_evidence": "Elementos visuais concretos que justificam a classificação",
  "species_candidates": [
    {{
      "name_pt": "Nome popular em português",
      "name_scientific": "Gênero species ou 'família Familidae' ou 'ordem Ordem'",
      "confidence": 0.0,
      "evidence": "Características morfológicas visíveis",
      "taxonomy_level": "species|genus|family|order|class"
    }}
  ],
  "archaeology_flags": ["APENAS se houver evidência clara: {flags}"],
  "archaeology_evidence": "Descreva evidências se houver, senão deixe vazio",
  "archaeology_confidence": 0.0,
  "activities": ["Atividades humanas visíveis: {activities}"],
  "technical_quality": "sharp|slightly_blurred|blurred|underexposed|overexposed|good_exposure",
  "keywords_raw": [
    "{min}-{max} palavras-chave descritivas",
    "Inclua: cores dominantes, texturas, elementos, condições climáticas"
  ]
}}

REGRAS CRÍTICAS:
1. Para espécies: seja CONSERVADOR. Se não tiver certeza razoável, use nível taxonômico superior
2. Para sambaquis: só marque se houver FORTE evidência
3. Para habitat: considere vegetação, substrato, presença de água, maré
4. NUNCA invente informações. Se não souber, indique baixa confiança
"#
        )
    }

    fn normalization_legacy(&self, raw_data: &str, categories: &str) -> String {
        let (min, max) = (self.min_keywords, self.max_keywords);
        format!(
            r#"Você receberá dados brutos de análise de uma imagem científica.
Sua tarefa: refinar e normalizar os metadados seguindo padrões Acquaplan.

DADOS BRUTOS:
{raw_data}

REFINE E RETORNE JSON:
{{
  "title": "Título conciso, 5-8 palavras",
  "description_short": "1 frase que captura a essência da imagem (20-30 palavras)",
  "description_long": "2-4 frases com contexto ecológico (60-100 palavras)",
  "keywords_normalized": [
    "{min}-{max} keywords normalizadas",
    "Use hierarquia nas categorias: {categories}",
    "Remova duplicatas e variações redundantes"
  ]
}}

MANTENHA: toda informação científica dos dados brutos (espécies, evidências, confiança)
"#
        )
    }
}
