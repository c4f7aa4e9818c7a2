use crate::compliance_models::{ComplianceStatus, Language};

/// Static label catalog for the two report languages. Every user-visible
/// string in the PDF comes from here so the rendered content is fully
/// determined by verdict + context + language.
pub struct Labels {
    pub lang: Language,
}

impl Labels {
    pub fn new(lang: Language) -> Self {
        Self { lang }
    }

    fn pick(&self, pt: &'static str, en: &'static str) -> &'static str {
        match self.lang {
            Language::Pt => pt,
            Language::En => en,
        }
    }

    pub fn title(&self) -> &'static str {
        self.pick(
            "GREENGATE | LAUDO DE TRIAGEM AMBIENTAL",
            "GREENGATE | ENVIRONMENTAL SCREENING REPORT",
        )
    }

    pub fn subtitle(&self) -> &'static str {
        self.pick(
            "Diligência Prévia EUDR - Regulamento (UE) 2023/1115",
            "EUDR Due Diligence - Regulation (EU) 2023/1115",
        )
    }

    pub fn report_code(&self) -> &'static str {
        self.pick("Código do laudo", "Report code")
    }

    pub fn issued_at(&self) -> &'static str {
        self.pick("Emitido em", "Issued at")
    }

    pub fn executive_summary(&self) -> &'static str {
        self.pick("RESUMO EXECUTIVO", "EXECUTIVE SUMMARY")
    }

    pub fn decision_synthesis(&self) -> &'static str {
        self.pick("SÍNTESE DA DECISÃO", "DECISION SYNTHESIS")
    }

    pub fn status_label(&self, status: ComplianceStatus) -> &'static str {
        match (status, self.lang) {
            (ComplianceStatus::Approved, Language::Pt) => "APTO",
            (ComplianceStatus::Approved, Language::En) => "SUITABLE",
            (ComplianceStatus::Warning, Language::Pt) => "APTO COM RESSALVAS",
            (ComplianceStatus::Warning, Language::En) => "SUITABLE WITH WARNINGS",
            (ComplianceStatus::Rejected, Language::Pt) => "NÃO APTO",
            (ComplianceStatus::Rejected, Language::En) => "NOT SUITABLE",
        }
    }

    pub fn risk_score(&self) -> &'static str {
        self.pick("Índice de conformidade", "Compliance score")
    }

    pub fn checks_passed(&self) -> &'static str {
        self.pick("critérios aprovados", "criteria passed")
    }

    pub fn checks_warning(&self) -> &'static str {
        self.pick("com ressalvas", "with warnings")
    }

    pub fn checks_failed(&self) -> &'static str {
        self.pick("reprovados", "failed")
    }

    pub fn checks_skipped(&self) -> &'static str {
        self.pick("não avaliados", "not evaluated")
    }

    pub fn interpretation_title(&self) -> &'static str {
        self.pick("INTERPRETAÇÃO", "INTERPRETATION")
    }

    pub fn interpretation_approved(&self) -> &'static str {
        self.pick(
            "A área analisada não apresentou sobreposição com as bases públicas de restrição consultadas. O talhão é compatível, nesta triagem, com os requisitos do EUDR para produção agrícola.",
            "The analyzed area showed no overlap with the public restriction datasets consulted. In this screening the plot is compatible with EUDR requirements for agricultural production.",
        )
    }

    pub fn interpretation_warning(&self) -> &'static str {
        self.pick(
            "A área analisada apresentou pontos de atenção que não a desqualificam, mas exigem verificação documental complementar antes da aquisição.",
            "The analyzed area raised attention points that do not disqualify it, but require complementary documentary verification before sourcing.",
        )
    }

    pub fn interpretation_rejected_prefix(&self) -> &'static str {
        self.pick(
            "A área analisada é NÃO APTA para aquisição sob o EUDR. Foram identificadas sobreposições com camadas impeditivas: ",
            "The analyzed area is NOT SUITABLE for sourcing under the EUDR. Overlaps were identified with blocking layers: ",
        )
    }

    pub fn interpretation_rejected_score(&self) -> &'static str {
        self.pick(
            "A área analisada foi reprovada pela pontuação agregada de risco, abaixo do limiar mínimo de conformidade.",
            "The analyzed area failed on the aggregate risk score, below the minimum compliance threshold.",
        )
    }

    pub fn sketch_title(&self) -> &'static str {
        self.pick("CROQUI DO TALHÃO", "PLOT SKETCH")
    }

    pub fn sketch_legend_plot(&self) -> &'static str {
        self.pick("Perímetro do talhão", "Plot perimeter")
    }

    pub fn sketch_legend_overlap(&self) -> &'static str {
        self.pick("Sobreposições detectadas", "Detected overlaps")
    }

    pub fn metadata_title(&self) -> &'static str {
        self.pick("DADOS DO TALHÃO", "PLOT DATA")
    }

    pub fn property(&self) -> &'static str {
        self.pick("Propriedade", "Property")
    }

    pub fn plot(&self) -> &'static str {
        self.pick("Talhão", "Plot")
    }

    pub fn municipality_state(&self) -> &'static str {
        self.pick("Município/UF", "Municipality/State")
    }

    pub fn crop(&self) -> &'static str {
        self.pick("Cultura", "Crop")
    }

    pub fn area(&self) -> &'static str {
        self.pick("Área", "Area")
    }

    pub fn centroid(&self) -> &'static str {
        self.pick("Centróide", "Centroid")
    }

    pub fn not_informed(&self) -> &'static str {
        self.pick("Não informado", "Not informed")
    }

    pub fn criteria_title(&self) -> &'static str {
        self.pick("CRITÉRIOS AVALIADOS", "EVALUATED CRITERIA")
    }

    pub fn col_criterion(&self) -> &'static str {
        self.pick("CRITÉRIO", "CRITERION")
    }

    pub fn col_result(&self) -> &'static str {
        self.pick("RESULTADO", "RESULT")
    }

    pub fn col_affected_area(&self) -> &'static str {
        self.pick("ÁREA AFETADA", "AFFECTED AREA")
    }

    pub fn col_score(&self) -> &'static str {
        self.pick("PONTOS", "SCORE")
    }

    pub fn result_word(&self, status: crate::compliance_models::CheckStatus) -> &'static str {
        use crate::compliance_models::CheckStatus;
        match (status, self.lang) {
            (CheckStatus::Pass, Language::Pt) => "OK - Aprovado",
            (CheckStatus::Pass, Language::En) => "OK - Passed",
            (CheckStatus::Fail, Language::Pt) => "X - Reprovado",
            (CheckStatus::Fail, Language::En) => "X - Failed",
            (CheckStatus::Warning, Language::Pt) => "! - Ressalva",
            (CheckStatus::Warning, Language::En) => "! - Warning",
            (CheckStatus::Skip, Language::Pt) => "- Não avaliado",
            (CheckStatus::Skip, Language::En) => "- Not evaluated",
        }
    }

    pub fn land_use_title(&self) -> &'static str {
        self.pick("HISTÓRICO DE USO DO SOLO", "LAND USE HISTORY")
    }

    pub fn col_year(&self) -> &'static str {
        self.pick("ANO", "YEAR")
    }

    pub fn col_land_use(&self) -> &'static str {
        self.pick("USO DO SOLO", "LAND USE")
    }

    pub fn sources_title(&self) -> &'static str {
        self.pick("FONTES DE DADOS", "DATA SOURCES")
    }

    pub fn col_layer(&self) -> &'static str {
        self.pick("CAMADA", "LAYER")
    }

    pub fn col_source(&self) -> &'static str {
        self.pick("FONTE", "SOURCE")
    }

    pub fn col_updated(&self) -> &'static str {
        self.pick("ATUALIZADO EM", "LAST UPDATED")
    }

    pub fn scope_title(&self) -> &'static str {
        self.pick("ESCOPO E LIMITAÇÕES", "SCOPE AND LIMITATIONS")
    }

    pub fn scope_text(&self) -> &'static str {
        self.pick(
            "Este laudo é uma triagem automatizada sobre bases públicas oficiais e não substitui avaliação ambiental de campo, análise documental da cadeia de custódia ou parecer jurídico. O resultado reflete as versões dos dados listadas acima na data de emissão. Sobreposições inferiores a 1 m² são desconsideradas por limitação de precisão cartográfica.",
            "This report is an automated screening over official public datasets and does not replace on-site environmental assessment, chain-of-custody document analysis or legal opinion. The result reflects the dataset versions listed above at the issue date. Overlaps below 1 m² are disregarded due to cartographic precision limits.",
        )
    }

    pub fn authenticity_title(&self) -> &'static str {
        self.pick("AUTENTICIDADE", "AUTHENTICITY")
    }

    pub fn authenticity_text(&self) -> &'static str {
        self.pick(
            "A autenticidade deste laudo pode ser conferida pelo QR Code ao lado ou pelo endereço abaixo. O conteúdo está vinculado ao veredito por hashes SHA-256 registrados no momento da emissão.",
            "The authenticity of this report can be checked via the QR Code on the side or the address below. The content is bound to the verdict by SHA-256 hashes registered at issue time.",
        )
    }

    pub fn technical_title(&self) -> &'static str {
        self.pick("METADADOS TÉCNICOS", "TECHNICAL METADATA")
    }

    pub fn geometry_hash(&self) -> &'static str {
        self.pick("Hash da geometria (SHA-256)", "Geometry hash (SHA-256)")
    }

    pub fn engine_version(&self) -> &'static str {
        self.pick("Versão do motor", "Engine version")
    }

    pub fn ruleset_version(&self) -> &'static str {
        self.pick("Versão do conjunto de regras", "Ruleset version")
    }

    pub fn processing_time(&self) -> &'static str {
        self.pick("Tempo de processamento", "Processing time")
    }

    pub fn brasilia_time(&self) -> &'static str {
        self.pick("Horário de Brasília", "Brasília time")
    }

    pub fn page_footer(&self) -> &'static str {
        self.pick(
            "Gerado automaticamente por GreenGate Geo-Compliance",
            "Automatically generated by GreenGate Geo-Compliance",
        )
    }

    /// Upstream organization for each reference layer.
    pub fn source_org(&self, check: crate::compliance_models::CheckType) -> &'static str {
        use crate::compliance_models::CheckType;
        match check {
            CheckType::DeforestationProdes => "INPE / PRODES",
            CheckType::DeforestationMapbiomas => "MapBiomas Alerta",
            CheckType::TerraIndigena => "FUNAI",
            CheckType::EmbargoIbama => "IBAMA",
            CheckType::Quilombola => "INCRA",
            CheckType::Uc => "ICMBio / MMA",
        }
    }
}
