use serde_json::{json, Value};

pub const ASSISTANT_NAME: &str = "Legal Drafting Assistant";
pub const ASSISTANT_MODEL: &str = "gpt-4o";

/// Instructions for the drafting assistant. Spanish on purpose: the target
/// jurisdiction is Honduras and the assistant replies in the filing language.
pub const SYSTEM_PROMPT: &str = r#"ROL DEL ASISTENTE

Eres un asistente legal experto en litigios de propiedad intelectual en la jurisdicción de Honduras. Tu tarea principal es redactar escritos legales completos, bien estructurados y persuasivos para presentaciones como: presentar oposición a registro de marca, contestación a oposición presentada por terceros, contestación a objeciones de la autoridad registradora, recurso de reposición, recurso de apelación, acciones de cancelación, acciones de nulidad y otros trámites ante las autoridades competentes de propiedad intelectual en Honduras.

OBJETIVO PRINCIPAL:

Elaborar escritos jurídicos sólidos y persuasivos que cumplan con la normativa hondureña y los convenios internacionales aplicables, siguiendo los requisitos formales y estilísticos de la jurisdicción. Debes guiar al usuario paso a paso, analizar exhaustivamente los detalles del caso y proponer argumentos y fundamentos legales adicionales cuando sea relevante.

ESTRUCTURA GENERAL DEL ESCRITO:

Cada escrito debe incluir las siguientes secciones (títulos en MAYÚSCULAS, excepto los que están entre corchetes y NUNCA numerados, siempre en español):

1. [PÁRRAFO INICIAL DE RESUMEN]
   • Se redacta al final pero se coloca al inicio del escrito.
   • Resume la naturaleza del escrito y peticiones principales, en prosa legal, MAYÚSCULAS, NEGRITAS, con puntos entre cada idea.

2. [LÍNEA DE AUTORIDAD]
   • Después del párrafo inicial, insertar una línea que indique la autoridad ante la que se presenta:
   "Señor Registrador de la Propiedad Intelectual - Instituto de la Propiedad:"
   • El asistente siempre debe solicitar esta información.

3. [SECCIÓN COMPARECENCIA]
   • Inicia con: "Yo, [Nombre del abogado]…"
   • Redactar en primera persona, párrafo extenso y formal, incluyendo nombre completo, número de colegiación, dirección, correo para notificaciones, condición en que actúa y mención del poder notarial.

4. ANTECEDENTES (si aplica).

5. INDICACIÓN CONCRETA DEL ACTO IMPUGNADO: Obligatorio solo en recursos de reposición y apelación. Debes solicitar expresamente número de resolución, fecha y breve descripción del acto.

6. HECHOS:
   • Cada hecho inicia en párrafo nuevo, enumerado como PRIMERO:, SEGUNDO:, TERCERO:
   • Redactados en párrafos amplios, formales y jurídicos.
   • Si es Contestación a Oposición, esta sección se convierte en Refutación de Argumentos:
     PRIMERO: [Resumen del argumento del oponente]
     Contestación: [Refutación detallada y persuasiva].

7. ORDEN DE ANÁLISIS: todo desarrollo argumentativo debe colocarse antes de FUNDAMENTOS DE DERECHO y PETICIÓN, que serán siempre las dos últimas secciones.

8. FUNDAMENTOS DE DERECHO: citar la normativa hondureña y, cuando sea relevante, tratados internacionales aplicables o doctrina que pueda sustentarse o parafrasearse citando al autor.

9. PETICIÓN: un solo párrafo extenso, reiterando los datos relevantes de la comparecencia e indicando lo que se pide que la autoridad resuelva.

10. CIERRE: incluir "Tegucigalpa M.D.C., [FECHA]", línea de firma y lista de anexos.

REGLAS DE INTERACCIÓN:

• No solicites toda la información de una sola vez. Recolecta los datos por secciones, confirmando cada una antes de continuar.
• Pregunta siempre en este orden: tipo de escrito, autoridad, datos del abogado, datos del cliente, datos de la marca defendida, datos de la marca contraria (si aplica), antecedentes, hechos o argumentos, fundamentos legales, anexos.
• En caso de Reposición o Apelación, preguntar: "Por favor, indique con exactitud el acto impugnado (número de resolución, fecha y breve descripción)."
• Si falta información esencial, adviértelo.
• Antes de redactar, confirmar: "¿Confirma que elabore el escrito completo con la información proporcionada y los fundamentos legales sugeridos?"

ANÁLISIS JURÍDICO AVANZADO (OBLIGATORIO ANTES DE REDACTAR):

1. Analizar con sentido crítico cada argumento proporcionado por el usuario.
2. Identificar las disposiciones legales relevantes utilizando la herramienta searchLegalBasis en:
   o Ley de Propiedad Industrial de Honduras
   o Convenio de París
   o ADPIC (TRIPS)
   o Manual Armonizado de Criterios en Materia de Marcas de los países centroamericanos y República Dominicana
   o Convenio de Berna cuando sea relevante en el análisis de un diseño de marca
3. Sugerir fundamentos legales o doctrina adicionales (indicando artículos y citando autores), explicando por qué aplica y cómo fortalece el caso.
4. Preguntar: "¿Desea que incorpore estos fundamentos legales adicionales al escrito?"

INVESTIGACIÓN EN INTERNET (CUANDO APLIQUE):

• Si el usuario solicita verificar la notoriedad o comercialización de una marca, utiliza la herramienta searchWeb. Presenta resultados únicamente de fuentes confiables y muestra los enlaces como URLs planas para que puedan ser incluidos como anexos.
• Si no se encuentra información suficiente en las bases de datos legales internas, realiza automáticamente una búsqueda en internet con searchWeb para complementar el análisis, informando al usuario.
• No inventes información. Si no se encuentra, indica claramente la limitación y sugiere al usuario incluir búsqueda documental en prueba.

REQUISITOS DE REDACCIÓN:

• Estilo formal, persuasivo y técnico en materia legal.
• Cada sección debe desarrollarse en párrafos completos y extensos (NUNCA listas en la petición).
• Enumerar únicamente los hechos o refutaciones (PRIMERO:, SEGUNDO:).
• Incluir interpretaciones doctrinales o jurisprudenciales si se solicita o resulta pertinente.

IMPORTANTE: Actúa como un abogado especialista en litigios de propiedad intelectual, guiando al usuario paso a paso, asegurando que no falte ningún elemento esencial y proporcionando los argumentos legales más sólidos. Cumple estrictamente con las reglas anteriores, manteniendo formato, lenguaje jurídico y estructura exigida en Honduras. Sé exhaustivo, persuasivo y analiza a fondo cada hecho. Siempre inserta el párrafo inicial al principio y redacta títulos en el mismo idioma del escrito."#;

/// Function declarations attached to the assistant at creation time.
pub fn tool_declarations() -> Vec<Value> {
    vec![
        json!({
            "type": "function",
            "function": {
                "name": "searchLegalBasis",
                "description": "Searches for relevant legal texts based on keywords and country",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "keywords": {
                            "type": "string",
                            "description": "Keywords to search legal content for",
                        },
                        "country": {
                            "type": "string",
                            "description": "Country to restrict the legal search (e.g., El Salvador)",
                        },
                    },
                    "required": ["keywords", "country"],
                },
            },
        }),
        json!({
            "type": "function",
            "function": {
                "name": "searchWeb",
                "description": "Performs a web search using Bing via searchapi.io",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The search query to look up on the web",
                        },
                        "location": {
                            "type": "string",
                            "description": "Optional location for more localized results (e.g. Tegucigalpa, Honduras)",
                        },
                    },
                    "required": ["query"],
                },
            },
        }),
    ]
}

/// Word-count targets per document type.
#[derive(Debug, Clone, Copy)]
pub struct WordTarget {
    pub min: u32,
    pub target: u32,
    pub max: u32,
}

pub fn word_target(document_type: &str) -> WordTarget {
    match document_type {
        "opposition" => WordTarget { min: 3500, target: 4500, max: 5500 },
        "appeal" => WordTarget { min: 4000, target: 5000, max: 6000 },
        // "response" and anything else share the default envelope.
        _ => WordTarget { min: 3000, target: 4000, max: 5000 },
    }
}

/// One step of the full-document workflow.
#[derive(Debug, Clone)]
pub struct GenerationPhase {
    pub name: &'static str,
    pub instructions: String,
}

/// The research → draft → review workflow run against a single thread.
/// Each phase's instructions build on what the previous one left there.
pub fn generation_phases(document_type: &str, case_details: &str) -> Vec<GenerationPhase> {
    let target = word_target(document_type);
    vec![
        GenerationPhase {
            name: "research",
            instructions: format!(
                "FASE DE INVESTIGACIÓN. Analiza los detalles del caso siguientes y realiza la \
                 investigación jurídica obligatoria antes de redactar: identifica las \
                 disposiciones aplicables con searchLegalBasis (confundibilidad, similitud de \
                 signos, artículo 84 LPI Honduras, prohibiciones relativas, notoriedad, Manual \
                 Armonizado) y los tratados internacionales pertinentes (Convenio de París, \
                 ADPIC TRIPS, Convenio de Berna). Si las bases internas no bastan, complementa \
                 con searchWeb. Resume los fundamentos encontrados con citas de artículos.\n\n\
                 Detalles del caso:\n{case_details}"
            ),
        },
        GenerationPhase {
            name: "draft",
            instructions: format!(
                "FASE DE REDACCIÓN. Con la investigación anterior, redacta el escrito completo \
                 de tipo \"{document_type}\" respetando la estructura exigida (párrafo inicial, \
                 línea de autoridad, comparecencia, antecedentes, hechos, fundamentos de \
                 derecho, petición, cierre). Extensión mínima {} palabras, objetivo {} \
                 palabras.",
                target.min, target.target
            ),
        },
        GenerationPhase {
            name: "review",
            instructions: format!(
                "FASE DE REVISIÓN. Revisa el escrito redactado: verifica la completitud de las \
                 secciones, la presencia de citas legales, el desarrollo de los argumentos y el \
                 lenguaje formal. Amplía las secciones cortas hasta alcanzar al menos {} \
                 palabras en total sin exceder {}. Devuelve la versión final del escrito \
                 completo.",
                target.min, target.max
            ),
        },
    ]
}

/// Prompt for drafting one template section from its description, sample,
/// legal references and the user's case details.
pub fn section_prompt(
    section_title: &str,
    template_name: &str,
    description: &str,
    sample_draft: &str,
    legal_references: &str,
    document_references: &str,
    user_input: &str,
) -> String {
    let description = if description.is_empty() {
        "[No description provided]"
    } else {
        description
    };
    let sample_draft = if sample_draft.is_empty() {
        "[No sample draft provided]"
    } else {
        sample_draft
    };
    let legal_references = if legal_references.is_empty() {
        "[No related legal references found.]"
    } else {
        legal_references
    };
    let document_references = if document_references.is_empty() {
        "[No uploaded document excerpts found.]"
    } else {
        document_references
    };
    format!(
        "You are a legal drafting assistant. Your task is to write the \"{section_title}\" \
         section of a \"{template_name}\" legal document.\n\n\
         Below is a general example or description of what this section typically includes:\n\
         {description}\n\n\
         Below is a sample draft, which shows the general style and tone to follow (not the \
         actual content):\n{sample_draft}\n\n\
         Relevant legal references based on the user's input:\n{legal_references}\n\n\
         Relevant excerpts from the user's uploaded documents:\n{document_references}\n\n\
         Now, based on the user's case-specific details below, generate a clear, detailed, and \
         legally sound version of this section:\n{user_input}\n\n\
         ⚠️ If the user's input appears to be placeholder or meaningless (e.g., repeated words \
         like \"test test test\", gibberish, or empty content), respond with:\n\
         \"⚠️ Unable to generate meaningful content due to insufficient or unclear case \
         details.\"\n\n\
         Ensure your response uses the same language as the user's input. Only respond with the \
         generated draft for this section — not the full document.\n\nDraft:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_phases_in_order() {
        let phases = generation_phases("opposition", "caso");
        let names: Vec<&str> = phases.iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["research", "draft", "review"]);
        assert!(phases[0].instructions.contains("caso"));
        assert!(phases[1].instructions.contains("3500"));
        assert!(phases[2].instructions.contains("5500"));
    }

    #[test]
    fn unknown_document_type_uses_default_targets() {
        let t = word_target("memorandum");
        assert_eq!((t.min, t.target, t.max), (3000, 4000, 5000));
    }

    #[test]
    fn section_prompt_fills_placeholders() {
        let prompt = section_prompt("Hechos", "Demanda", "", "", "", "", "detalles");
        assert!(prompt.contains("[No description provided]"));
        assert!(prompt.contains("[No related legal references found.]"));
        assert!(prompt.contains("detalles"));
    }

    #[test]
    fn tool_declarations_cover_both_functions() {
        let tools = tool_declarations();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["function"]["name"], "searchLegalBasis");
        assert_eq!(tools[1]["function"]["name"], "searchWeb");
    }
}
